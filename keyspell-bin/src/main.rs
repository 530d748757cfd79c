use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use gumdrop::Options;
use serde::Serialize;

use keyspell::dictionary::{AssetSource, DirectoryAssets, MemoryAssets};
use keyspell::learned::{JsonFileStorage, MemoryStorage, VocabularyStorage};
use keyspell::{
    EngineConfig, InputMethod, KeyboardEngine, LearnedWordEntry, LearningStats,
    SuggestionCandidate,
};

trait OutputWriter {
    fn write_suggestions(&mut self, word: &str, is_correct: bool, suggestions: &[SuggestionCandidate]);
    fn write_learned(&mut self, word: &str, entry: Option<&LearnedWordEntry>);
    fn write_removed(&mut self, word: &str, removed: bool);
    fn write_stats(&mut self, stats: &LearningStats);
    fn finish(&mut self) -> anyhow::Result<()>;
}

struct StdoutWriter;

impl OutputWriter for StdoutWriter {
    fn write_suggestions(&mut self, word: &str, is_correct: bool, suggestions: &[SuggestionCandidate]) {
        println!(
            "Input: {}\t\t[{}]",
            &word,
            if is_correct { "CORRECT" } else { "INCORRECT" }
        );
        for sugg in suggestions {
            println!("{}\t\t{:.3}\t{:?}", sugg.word, sugg.confidence, sugg.source);
        }
        println!();
    }

    fn write_learned(&mut self, word: &str, entry: Option<&LearnedWordEntry>) {
        match entry {
            Some(entry) => println!("{}\t\tfrequency {}", entry.display_word, entry.frequency),
            None => println!("{}\t\t[NOT LEARNED]", word),
        }
    }

    fn write_removed(&mut self, word: &str, removed: bool) {
        println!("{}\t\t[{}]", word, if removed { "REMOVED" } else { "NOT FOUND" });
    }

    fn write_stats(&mut self, stats: &LearningStats) {
        println!("Words: {}", stats.total_words);
        println!("Average frequency: {:.2}", stats.average_frequency);
        let mut sources: Vec<_> = stats.by_source.iter().collect();
        sources.sort();
        for (source, count) in sources {
            println!("  {:?}: {}", source, count);
        }
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionRequest {
    word: String,
    is_correct: bool,
    suggestions: Vec<SuggestionCandidate>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum JsonResult {
    Suggestions(SuggestionRequest),
    Learned {
        word: String,
        entry: Option<LearnedWordEntry>,
    },
    Removed {
        word: String,
        removed: bool,
    },
    Stats(LearningStats),
}

#[derive(Serialize)]
struct JsonWriter {
    results: Vec<JsonResult>,
}

impl JsonWriter {
    pub fn new() -> JsonWriter {
        JsonWriter { results: vec![] }
    }
}

impl OutputWriter for JsonWriter {
    fn write_suggestions(&mut self, word: &str, is_correct: bool, suggestions: &[SuggestionCandidate]) {
        self.results.push(JsonResult::Suggestions(SuggestionRequest {
            word: word.to_owned(),
            is_correct,
            suggestions: suggestions.to_vec(),
        }));
    }

    fn write_learned(&mut self, word: &str, entry: Option<&LearnedWordEntry>) {
        self.results.push(JsonResult::Learned {
            word: word.to_owned(),
            entry: entry.cloned(),
        });
    }

    fn write_removed(&mut self, word: &str, removed: bool) {
        self.results.push(JsonResult::Removed {
            word: word.to_owned(),
            removed,
        });
    }

    fn write_stats(&mut self, stats: &LearningStats) {
        self.results.push(JsonResult::Stats(stats.clone()));
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}

#[derive(Debug, Options)]
struct Args {
    #[options(help = "print help message")]
    help: bool,

    #[options(command)]
    command: Option<Command>,
}

#[derive(Debug, Options)]
enum Command {
    #[options(help = "get suggestions for provided input")]
    Suggest(SuggestArgs),

    #[options(help = "add words to the learned vocabulary")]
    Learn(LearnArgs),

    #[options(help = "remove words from the learned vocabulary")]
    Forget(LearnArgs),

    #[options(help = "print learned vocabulary statistics")]
    Stats(StatsArgs),
}

#[derive(Debug, Options)]
struct SuggestArgs {
    #[options(help = "print help message")]
    help: bool,

    #[options(help = "directory of <language>.txt word lists", required)]
    dict: PathBuf,

    #[options(help = "JSON file of learned words")]
    store: Option<PathBuf>,

    #[options(help = "active language, may be repeated (default: en)")]
    lang: Vec<String>,

    #[options(help = "engine configuration file (JSON)")]
    config: Option<PathBuf>,

    #[options(help = "maximum number of results")]
    nbest: Option<usize>,

    #[options(no_short, long = "json", help = "output in JSON format")]
    use_json: bool,

    #[options(free, help = "words to be processed")]
    inputs: Vec<String>,
}

#[derive(Debug, Options)]
struct LearnArgs {
    #[options(help = "print help message")]
    help: bool,

    #[options(help = "JSON file of learned words", required)]
    store: PathBuf,

    #[options(help = "language to learn under (default: en)")]
    lang: Option<String>,

    #[options(no_short, long = "json", help = "output in JSON format")]
    use_json: bool,

    #[options(free, help = "words to be processed")]
    inputs: Vec<String>,
}

#[derive(Debug, Options)]
struct StatsArgs {
    #[options(help = "print help message")]
    help: bool,

    #[options(help = "JSON file of learned words", required)]
    store: PathBuf,

    #[options(help = "only count words of this language")]
    lang: Option<String>,

    #[options(no_short, long = "json", help = "output in JSON format")]
    use_json: bool,
}

fn read_words(inputs: Vec<String>) -> anyhow::Result<Vec<String>> {
    if !inputs.is_empty() {
        return Ok(inputs);
    }

    eprintln!("Reading from stdin...");
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer
        .lines()
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect())
}

fn writer(use_json: bool) -> Box<dyn OutputWriter> {
    if use_json {
        Box::new(JsonWriter::new())
    } else {
        Box::new(StdoutWriter)
    }
}

fn open_store(path: &Path) -> anyhow::Result<Arc<dyn VocabularyStorage>> {
    let storage = JsonFileStorage::open(path)
        .with_context(|| format!("opening learned words at {}", path.display()))?;
    Ok(Arc::new(storage))
}

fn engine(
    config: EngineConfig,
    assets: Arc<dyn AssetSource>,
    storage: Arc<dyn VocabularyStorage>,
) -> KeyboardEngine {
    KeyboardEngine::new(config, assets, storage)
}

async fn suggest(args: SuggestArgs) -> anyhow::Result<()> {
    let mut config = match args.config.as_deref() {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if !args.lang.is_empty() {
        config.languages = args.lang.iter().map(|l| l.as_str().into()).collect();
    }
    if let Some(n) = args.nbest {
        config.suggestion_count = n;
    }

    let storage: Arc<dyn VocabularyStorage> = match args.store.as_deref() {
        Some(path) => open_store(path)?,
        None => Arc::new(MemoryStorage::new()),
    };
    let languages = config.languages.clone();
    let engine = engine(config, Arc::new(DirectoryAssets::new(&args.dict)), storage);

    for language in languages.iter() {
        if let Err(e) = engine.preload_language(language).await {
            log::warn!("{}: {}", language, e);
        }
    }

    let mut writer = writer(args.use_json);
    for word in read_words(args.inputs)? {
        let is_correct = engine.is_word_in_dictionary(&word).await?;
        let suggestions = engine.get_spelling_suggestions_with_confidence(&word).await?;
        writer.write_suggestions(&word, is_correct, &suggestions);
    }

    writer.finish()
}

async fn learn(args: LearnArgs, forget: bool) -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    if let Some(lang) = args.lang.as_deref() {
        config.languages = vec![lang.into()];
    }
    let engine = engine(config, Arc::new(MemoryAssets::new()), open_store(&args.store)?);

    let mut writer = writer(args.use_json);
    for word in read_words(args.inputs)? {
        if forget {
            let removed = engine.remove_word(&word).await?;
            writer.write_removed(&word, removed);
        } else {
            let entry = engine.learn_word(&word, InputMethod::Imported).await?;
            writer.write_learned(&word, entry.as_ref());
        }
    }

    writer.finish()
}

async fn stats(args: StatsArgs) -> anyhow::Result<()> {
    let engine = engine(
        EngineConfig::default(),
        Arc::new(MemoryAssets::new()),
        open_store(&args.store)?,
    );

    let stats = match args.lang.as_deref() {
        Some(lang) => engine.get_language_stats(lang).await?,
        None => engine.get_learning_stats().await?,
    };

    let mut writer = writer(args.use_json);
    writer.write_stats(&stats);
    writer.finish()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = Args::parse_args_default_or_exit();

    match args.command {
        None => Ok(()),
        Some(Command::Suggest(args)) => suggest(args).await,
        Some(Command::Learn(args)) => learn(args, false).await,
        Some(Command::Forget(args)) => learn(args, true).await,
        Some(Command::Stats(args)) => stats(args).await,
    }
}
