//! Key positions, used to favour corrections of adjacent-key slips.
use hashbrown::HashMap;

/// Maximum centre-to-centre distance, in key widths, of two keys counted as
/// neighbours.
pub const PROXIMITY_THRESHOLD: f32 = 1.5;

pub type KeyPositions = HashMap<char, (f32, f32)>;

/// Supplies the centre of each character's key in key-width units.
///
/// Returning `None` disables proximity scoring.
pub trait KeyboardGeometry: Send + Sync {
    fn key_positions(&self) -> Option<KeyPositions>;
}

/// A plain QWERTY layout with the usual row stagger.
#[derive(Debug, Default, Clone, Copy)]
pub struct QwertyGeometry;

const QWERTY_ROWS: [(&str, f32); 3] = [("qwertyuiop", 0.0), ("asdfghjkl", 0.5), ("zxcvbnm", 1.5)];

impl KeyboardGeometry for QwertyGeometry {
    fn key_positions(&self) -> Option<KeyPositions> {
        let mut positions = HashMap::new();
        for (y, (row, offset)) in QWERTY_ROWS.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                positions.insert(ch, (x as f32 + offset, y as f32));
            }
        }
        Some(positions)
    }
}

/// Geometry for hosts that have no layout information.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGeometry;

impl KeyboardGeometry for NoGeometry {
    fn key_positions(&self) -> Option<KeyPositions> {
        None
    }
}

fn key_distance(positions: &KeyPositions, a: char, b: char) -> Option<f32> {
    let (ax, ay) = positions.get(&a)?;
    let (bx, by) = positions.get(&b)?;
    Some(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
}

/// True when `candidate` differs from `typed` by exactly one substituted
/// character and the two keys are neighbours.
pub fn is_adjacent_substitution(positions: &KeyPositions, typed: &str, candidate: &str) -> bool {
    let typed: Vec<char> = typed.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    if typed.len() != candidate.len() {
        return false;
    }

    let mut diffs = typed.iter().zip(candidate.iter()).filter(|(a, b)| a != b);
    match (diffs.next(), diffs.next()) {
        (Some((&a, &b)), None) => key_distance(positions, a, b)
            .map_or(false, |d| d <= PROXIMITY_THRESHOLD),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours() {
        let positions = QwertyGeometry.key_positions().unwrap();
        assert!(is_adjacent_substitution(&positions, "tesr", "test"));
        assert!(is_adjacent_substitution(&positions, "hwllo", "hello"));
        assert!(!is_adjacent_substitution(&positions, "tesp", "test"));
        assert!(!is_adjacent_substitution(&positions, "test", "test"));
        assert!(!is_adjacent_substitution(&positions, "tset", "test"));
        assert!(!is_adjacent_substitution(&positions, "tst", "test"));
    }

    #[test]
    fn missing_geometry() {
        assert!(NoGeometry.key_positions().is_none());
    }
}
