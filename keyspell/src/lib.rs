/*! Spelling suggestions and word learning for on-screen keyboards.

Given a typed or gesture-entered fragment, keyspell produces a
confidence-ranked list of corrections and completions drawn from three
sources: the user's learned vocabulary, prefix completions from a frequency
dictionary, and SymSpell-style fuzzy matches from the same dictionary. It
keeps learning the user's words as they type, and isolates storage and
dictionary failures so that a broken store never blocks a keystroke.

# Usage examples

```
use std::sync::Arc;
use keyspell::{EngineConfig, InputMethod, KeyboardEngine};
use keyspell::dictionary::MemoryAssets;
use keyspell::learned::MemoryStorage;

# #[tokio::main(flavor = "current_thread")]
# async fn main() -> Result<(), keyspell::EngineError> {
let assets = MemoryAssets::new();
assets.insert("en", "hello 1000000\nhelp 5000\n");

let engine = KeyboardEngine::new(
    EngineConfig::default(),
    Arc::new(assets),
    Arc::new(MemoryStorage::new()),
);

engine.learn_word("myapi", InputMethod::Typed).await?;
let suggestions = engine.get_spelling_suggestions_with_confidence("helo").await?;
assert_eq!(suggestions[0].word, "hello");
# Ok(())
# }
```

Further examples of how to drive the engine can be found in the
`keyspell-bin` crate in the same repository.
*/

pub mod bigram;
pub mod cache;
pub mod cancel;
pub mod case;
pub mod config;
pub mod dictionary;
pub mod distance;
pub mod engine;
pub mod error;
pub mod keyboard;
pub mod learned;
pub mod normalize;
pub mod ranking;
pub mod resilience;

pub use crate::cancel::CancellationToken;
pub use crate::config::{EngineConfig, ResilienceConfig};
pub use crate::engine::{KeyboardEngine, SuggestionSession};
pub use crate::error::{AssetError, EngineError, StorageError, ValidationError};
pub use crate::learned::{InputMethod, LearnedWordEntry, LearningStats};
pub use crate::normalize::{normalize, NormalizedWord};
pub use crate::ranking::{SourceKind, SuggestionCandidate};
