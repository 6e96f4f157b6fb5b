//! Text translation with one lazily loaded model per language pair.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::PairModel;
use crate::error::{Error, Result};
use crate::language::LanguagePair;

/// Text-to-text translation between two language codes.
pub trait Translate: Send + Sync {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}

/// A loaded tokenizer + model unit serving a single language pair.
pub trait TranslationModel: Send {
    fn generate(&mut self, text: &str) -> Result<String>;
}

/// Produces [`TranslationModel`]s; failures surface as [`Error::ModelLoad`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, pair: &LanguagePair, model: &PairModel) -> Result<Box<dyn TranslationModel>>;
}

type ModelSlot = Arc<OnceCell<Mutex<Box<dyn TranslationModel>>>>;

pub struct Translator<L> {
    loader: L,
    pairs: BTreeMap<String, PairModel>,
    cache: Mutex<HashMap<LanguagePair, ModelSlot>>,
}

impl<L: ModelLoader> Translator<L> {
    pub fn new(loader: L, pairs: BTreeMap<String, PairModel>) -> Self {
        Translator {
            loader,
            pairs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Pairs this translator has a model configured for, as `source-target`.
    pub fn supported_pairs(&self) -> Vec<String> {
        self.pairs.keys().cloned().collect()
    }

    /// Pairs whose model is currently loaded.
    pub fn loaded_pairs(&self) -> Vec<LanguagePair> {
        let cache = self.cache.lock();
        let mut loaded: Vec<_> = cache
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(pair, _)| pair.clone())
            .collect();
        loaded.sort();
        loaded
    }

    /// Finds the configured model for `pair`, retrying without region subtags.
    fn resolve(&self, pair: &LanguagePair) -> Option<(LanguagePair, &PairModel)> {
        if let Some(model) = self.pairs.get(&pair.key()) {
            return Some((pair.clone(), model));
        }
        let primary = pair.primary();
        let model = self.pairs.get(&primary.key())?;
        Some((primary, model))
    }

    fn slot(&self, pair: &LanguagePair) -> ModelSlot {
        let mut cache = self.cache.lock();
        cache.entry(pair.clone()).or_default().clone()
    }
}

impl<L: ModelLoader> Translate for Translator<L> {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let requested = LanguagePair::new(source_lang, target_lang);
        let Some((pair, model)) = self.resolve(&requested) else {
            return Err(Error::UnsupportedLanguagePair {
                from: requested.source,
                to: requested.target,
            });
        };

        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let slot = self.slot(&pair);
        let unit = slot.get_or_try_init(|| {
            info!("Loading translation model: {}", model.model_id);
            self.loader.load(&pair, model).map(Mutex::new)
        })?;

        let translated = unit.lock().generate(text)?;
        debug!(
            "Translated ({}): {} -> {}",
            pair,
            preview(text),
            preview(&translated)
        );
        Ok(translated)
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loader whose models prefix their input with the target language.
    #[derive(Default)]
    pub struct CountingLoader {
        pub loads: AtomicUsize,
        pub failures_left: AtomicUsize,
    }

    impl CountingLoader {
        pub fn failing(times: usize) -> Self {
            CountingLoader {
                loads: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(times),
            }
        }

        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    struct PrefixModel(String);

    impl TranslationModel for PrefixModel {
        fn generate(&mut self, text: &str) -> Result<String> {
            Ok(format!("[{}] {}", self.0, text))
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, pair: &LanguagePair, _model: &PairModel) -> Result<Box<dyn TranslationModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::ModelLoad(format!("{pair}: weights unavailable")));
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Box::new(PrefixModel(pair.target.clone())))
        }
    }

    impl<T: ModelLoader + ?Sized> ModelLoader for Arc<T> {
        fn load(&self, pair: &LanguagePair, model: &PairModel) -> Result<Box<dyn TranslationModel>> {
            (**self).load(pair, model)
        }
    }

    pub fn pairs(keys: &[&str]) -> BTreeMap<String, PairModel> {
        keys.iter()
            .map(|k| (k.to_string(), PairModel::new(&format!("test/opus-mt-{k}"))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{CountingLoader, pairs};
    use super::*;

    #[test]
    fn same_pair_loads_model_once() {
        let loader = Arc::new(CountingLoader::default());
        let translator = Translator::new(loader.clone(), pairs(&["en-fr"]));

        assert_eq!(
            translator.translate("Hello", "en", "fr").unwrap(),
            "[fr] Hello"
        );
        assert_eq!(
            translator.translate("World", "en", "fr").unwrap(),
            "[fr] World"
        );
        assert_eq!(loader.loads(), 1);
        assert_eq!(translator.loaded_pairs(), vec![LanguagePair::new("en", "fr")]);
    }

    #[test]
    fn unsupported_pair_is_rejected_without_touching_cache() {
        let loader = Arc::new(CountingLoader::default());
        let translator = Translator::new(loader.clone(), pairs(&["en-fr"]));

        let err = translator.translate("Hello", "en", "xx").unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedLanguagePair { ref from, ref to } if from == "en" && to == "xx"
        ));
        assert_eq!(loader.loads(), 0);
        assert!(translator.cache.lock().is_empty());
    }

    #[test]
    fn failed_load_does_not_poison_cache() {
        let loader = Arc::new(CountingLoader::failing(1));
        let translator = Translator::new(loader.clone(), pairs(&["en-es"]));

        let err = translator.translate("Hola", "en", "es").unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(translator.loaded_pairs().is_empty());

        assert_eq!(
            translator.translate("Hola", "en", "es").unwrap(),
            "[es] Hola"
        );
        assert_eq!(loader.loads(), 2);
    }

    #[test]
    fn empty_text_round_trips_without_loading() {
        let loader = Arc::new(CountingLoader::default());
        let translator = Translator::new(loader.clone(), pairs(&["en-de"]));
        assert_eq!(translator.translate("", "en", "de").unwrap(), "");
        assert_eq!(loader.loads(), 0);
    }

    #[test]
    fn region_subtag_falls_back_to_primary_pair() {
        let loader = Arc::new(CountingLoader::default());
        let translator = Translator::new(loader.clone(), pairs(&["en-zh"]));
        assert_eq!(
            translator.translate("Hi", "en", "zh-cn").unwrap(),
            "[zh] Hi"
        );
        translator.translate("Hi again", "en", "zh").unwrap();
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn concurrent_first_use_loads_once() {
        let loader = Arc::new(CountingLoader::default());
        let translator = Translator::new(loader.clone(), pairs(&["en-it"]));

        std::thread::scope(|s| {
            for i in 0..8 {
                let translator = &translator;
                s.spawn(move || {
                    translator
                        .translate(&format!("line {i}"), "en", "it")
                        .unwrap()
                });
            }
        });
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn supported_pairs_lists_configuration() {
        let translator = Translator::new(CountingLoader::default(), pairs(&["en-fr", "en-es"]));
        assert_eq!(translator.supported_pairs(), vec!["en-es", "en-fr"]);
    }
}
