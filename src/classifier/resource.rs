//! Classifier Resource
//!
//! Owns the one classifier handle of the process. The handle is built lazily
//! by a one-time-init cell:
//!
//! ```text
//! Uninitialized → Initializing → Ready
//!                              ↘ Failed   (sticky; restart to recover)
//! ```
//!
//! Concurrent first accesses block on the cell until the loader returns,
//! then share the same handle. A load failure is kept and re-surfaced to
//! every later caller without retrying.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::classifier::lexicon::LexiconOracle;
use crate::classifier::oracle::{OracleError, Prediction, SentimentOracle};
use crate::classifier::{
    BatchItem, Classification, ClassifierConfig, ClassifierError, DeviceClass, ModelInfo,
};
use crate::storage::Label;

/// Builds the oracle from configuration; runs at most once per resource
pub type OracleLoader =
    Arc<dyn Fn(&ClassifierConfig) -> Result<Arc<dyn SentimentOracle>, OracleError> + Send + Sync>;

/// Lifecycle state of the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::Uninitialized => write!(f, "uninitialized"),
            ResourceState::Initializing => write!(f, "initializing"),
            ResourceState::Ready => write!(f, "ready"),
            ResourceState::Failed => write!(f, "failed"),
        }
    }
}

/// The ready-to-use oracle plus what was resolved while loading it
pub struct ClassifierHandle {
    oracle: Arc<dyn SentimentOracle>,
    model_name: String,
    device: DeviceClass,
    cache_dir: PathBuf,
    /// Present when the oracle cannot take concurrent calls
    call_gate: Option<Mutex<()>>,
}

impl ClassifierHandle {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn device(&self) -> DeviceClass {
        self.device
    }

    pub fn labels(&self) -> &[Label] {
        self.oracle.labels()
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.model_name.clone(),
            device: self.device,
            cache_dir: self.cache_dir.display().to_string(),
        }
    }

    fn predict(&self, texts: &[String]) -> Result<Vec<Vec<Prediction>>, ClassifierError> {
        // Poisoning only means another caller panicked mid-call; the gate guards no data.
        let _guard = self
            .call_gate
            .as_ref()
            .map(|gate| gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));

        let output = self.oracle.predict(texts).map_err(|e| {
            tracing::error!(error = %e, "Classifier oracle call failed");
            ClassifierError::Oracle(e.to_string())
        })?;

        if output.len() != texts.len() {
            return Err(ClassifierError::Oracle(format!(
                "oracle returned {} results for {} inputs",
                output.len(),
                texts.len()
            )));
        }
        Ok(output)
    }
}

/// Lazily-initialized, shared classification capability
pub struct ClassifierResource {
    config: ClassifierConfig,
    loader: OracleLoader,
    cell: OnceLock<Result<ClassifierHandle, ClassifierError>>,
    initializing: AtomicBool,
}

impl ClassifierResource {
    /// Resource backed by the built-in lexicon oracle
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_loader(config, Arc::new(lexicon_loader))
    }

    /// Resource with a custom oracle loader
    pub fn with_loader(config: ClassifierConfig, loader: OracleLoader) -> Self {
        Self {
            config,
            loader,
            cell: OnceLock::new(),
            initializing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Current lifecycle state; never triggers initialization
    pub fn state(&self) -> ResourceState {
        match self.cell.get() {
            Some(Ok(_)) => ResourceState::Ready,
            Some(Err(_)) => ResourceState::Failed,
            None if self.initializing.load(Ordering::Acquire) => ResourceState::Initializing,
            None => ResourceState::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ResourceState::Ready
    }

    /// Explicit startup phase: load the oracle now instead of on first use
    pub fn initialize(&self) -> Result<(), ClassifierError> {
        self.handle().map(|_| ())
    }

    /// The ready handle, initializing on first access
    pub fn handle(&self) -> Result<&ClassifierHandle, ClassifierError> {
        self.cell
            .get_or_init(|| self.load())
            .as_ref()
            .map_err(Clone::clone)
    }

    /// The handle if initialization already succeeded; never blocks
    pub fn ready_handle(&self) -> Option<&ClassifierHandle> {
        self.cell.get().and_then(|result| result.as_ref().ok())
    }

    fn load(&self) -> Result<ClassifierHandle, ClassifierError> {
        self.initializing.store(true, Ordering::Release);
        tracing::info!(
            model = %self.config.model_name,
            device = %self.config.device,
            cache_dir = %self.config.cache_dir.display(),
            "Initializing classifier"
        );

        let result = (self.loader)(&self.config)
            .map(|oracle| {
                let device = self.config.device.resolve(oracle.supports_accelerator());
                let call_gate = (!oracle.is_thread_safe()).then(|| Mutex::new(()));
                ClassifierHandle {
                    model_name: oracle.model_name().to_string(),
                    device,
                    cache_dir: self.config.cache_dir.clone(),
                    call_gate,
                    oracle,
                }
            })
            .map_err(|e| ClassifierError::Unavailable(e.to_string()));

        match &result {
            Ok(handle) => tracing::info!(
                model = %handle.model_name,
                device = %handle.device,
                serialized = handle.call_gate.is_some(),
                "Classifier ready"
            ),
            Err(e) => tracing::error!(error = %e, "Classifier initialization failed"),
        }

        self.initializing.store(false, Ordering::Release);
        result
    }

    /// Classify one text, returning the top label
    pub fn classify(&self, text: &str) -> Result<Classification, ClassifierError> {
        let predictions = self.classify_all(text)?;
        let top = top_prediction(&predictions)?;
        Ok(Classification {
            label: top.label,
            score: top.score,
        })
    }

    /// Classify one text, returning the score of every label
    pub fn classify_all(&self, text: &str) -> Result<Vec<Prediction>, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::InvalidInput(
                "Text cannot be empty".to_string(),
            ));
        }

        let handle = self.handle()?;
        let mut output = handle.predict(&[text.to_string()])?;
        let predictions = output.pop().unwrap_or_default();
        sanitize(predictions)
    }

    /// Classify many texts in input order, skipping empty entries
    ///
    /// `batch_size` only controls how many texts go to the oracle per call.
    pub fn classify_batch(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<BatchItem>, ClassifierError> {
        if texts.is_empty() {
            return Err(ClassifierError::EmptyBatch);
        }

        let valid: Vec<String> = texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect();
        if valid.is_empty() {
            return Err(ClassifierError::AllInputsInvalid);
        }

        let handle = self.handle()?;
        let mut items = Vec::with_capacity(valid.len());

        for chunk in valid.chunks(batch_size.max(1)) {
            let output = handle.predict(chunk)?;
            for (text, predictions) in chunk.iter().zip(output) {
                let predictions = sanitize(predictions)?;
                let top = top_prediction(&predictions)?;
                items.push(BatchItem {
                    text: text.clone(),
                    label: top.label,
                    score: top.score,
                });
            }
        }

        tracing::debug!(
            submitted = texts.len(),
            classified = items.len(),
            "Batch classified"
        );
        Ok(items)
    }

    /// Static description of the model
    ///
    /// Before loading finishes (or after it failed) this reports the
    /// configured values.
    pub fn describe(&self) -> Result<ModelInfo, ClassifierError> {
        match (self.cell.get(), self.state()) {
            (Some(Ok(handle)), _) => Ok(handle.info()),
            (_, ResourceState::Uninitialized) => Err(ClassifierError::NotInitialized),
            _ => Ok(ModelInfo {
                model_name: self.config.model_name.clone(),
                device: self.config.device.resolve(false),
                cache_dir: self.config.cache_dir.display().to_string(),
            }),
        }
    }
}

/// Default loader: the lexicon oracle, named after the configured model
fn lexicon_loader(config: &ClassifierConfig) -> Result<Arc<dyn SentimentOracle>, OracleError> {
    let oracle = LexiconOracle::load(config.model_name.clone(), &config.cache_dir)?;
    Ok(Arc::new(oracle))
}

/// Round to 4 decimals and clamp into [0, 1]
fn sanitize(predictions: Vec<Prediction>) -> Result<Vec<Prediction>, ClassifierError> {
    if predictions.is_empty() {
        return Err(ClassifierError::Oracle("oracle returned no predictions".to_string()));
    }
    predictions
        .into_iter()
        .map(|p| {
            if !p.score.is_finite() {
                return Err(ClassifierError::Oracle(format!(
                    "non-finite score for {}",
                    p.label
                )));
            }
            let score = ((p.score * 10_000.0).round() / 10_000.0).clamp(0.0, 1.0);
            Ok(Prediction::new(p.label, score))
        })
        .collect()
}

pub(crate) fn top_prediction(predictions: &[Prediction]) -> Result<Prediction, ClassifierError> {
    predictions
        .iter()
        .copied()
        .reduce(|best, p| if p.score > best.score { p } else { best })
        .ok_or_else(|| ClassifierError::Oracle("oracle returned no predictions".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DeviceSelection;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            cache_dir: std::env::temp_dir().join("sentiscope-no-lexicon-here"),
            ..ClassifierConfig::default()
        }
    }

    /// Echo oracle that records how many times it was constructed
    struct CountingOracle {
        calls: Arc<AtomicUsize>,
        thread_safe: bool,
    }

    impl SentimentOracle for CountingOracle {
        fn model_name(&self) -> &str {
            "counting"
        }

        fn predict(&self, texts: &[String]) -> Result<Vec<Vec<Prediction>>, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let positive = if t.contains('+') { 0.91234 } else { 0.2 };
                    vec![
                        Prediction::new(Label::Positive, positive),
                        Prediction::new(Label::Negative, 1.0 - positive),
                    ]
                })
                .collect())
        }

        fn supports_accelerator(&self) -> bool {
            true
        }

        fn is_thread_safe(&self) -> bool {
            self.thread_safe
        }
    }

    fn counting_resource(
        loads: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        device: DeviceSelection,
    ) -> ClassifierResource {
        let loader: OracleLoader = Arc::new(move |_cfg: &ClassifierConfig| {
            loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(CountingOracle {
                calls: Arc::clone(&calls),
                thread_safe: false,
            }) as Arc<dyn SentimentOracle>)
        });
        ClassifierResource::with_loader(
            ClassifierConfig {
                device,
                ..config()
            },
            loader,
        )
    }

    #[test]
    fn test_lexicon_resource_scenarios() {
        let resource = ClassifierResource::new(config());

        let result = resource.classify("I love this product!").unwrap();
        assert_eq!(result.label, Label::Positive);
        assert!(result.score > 0.5 && result.score <= 1.0);

        assert!(matches!(
            resource.classify(""),
            Err(ClassifierError::InvalidInput(_))
        ));
        assert!(matches!(
            resource.classify("   \n"),
            Err(ClassifierError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_state_transitions() {
        let resource = ClassifierResource::new(config());
        assert_eq!(resource.state(), ResourceState::Uninitialized);
        assert!(matches!(
            resource.describe(),
            Err(ClassifierError::NotInitialized)
        ));

        resource.initialize().unwrap();
        assert_eq!(resource.state(), ResourceState::Ready);

        let info = resource.describe().unwrap();
        assert_eq!(info.model_name, ClassifierConfig::default().model_name);
        assert_eq!(info.device, DeviceClass::Cpu);
    }

    #[test]
    fn test_concurrent_first_access_initializes_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let resource = Arc::new(counting_resource(
            Arc::clone(&loads),
            Arc::clone(&calls),
            DeviceSelection::Auto,
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resource = Arc::clone(&resource);
                thread::spawn(move || resource.classify(&format!("text {}+", i)))
            })
            .collect();

        for handle in handles {
            let result = handle.join().unwrap().unwrap();
            assert_eq!(result.label, Label::Positive);
            assert_eq!(result.score, 0.9123);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(resource.describe().unwrap().device, DeviceClass::Accelerator);
    }

    #[test]
    fn test_ready_handle_does_not_wait_for_initialization() {
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        let calls = Arc::new(AtomicUsize::new(0));
        let oracle_calls = Arc::clone(&calls);

        let loader: OracleLoader = Arc::new(move |_cfg: &ClassifierConfig| {
            started_tx.lock().unwrap().send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
            Ok(Arc::new(CountingOracle {
                calls: Arc::clone(&oracle_calls),
                thread_safe: true,
            }) as Arc<dyn SentimentOracle>)
        });
        let resource = Arc::new(ClassifierResource::with_loader(config(), loader));

        let loading = Arc::clone(&resource);
        let init = thread::spawn(move || loading.initialize());
        started_rx.recv().unwrap();

        assert_eq!(resource.state(), ResourceState::Initializing);
        assert!(resource.ready_handle().is_none());

        release_tx.send(()).unwrap();
        init.join().unwrap().unwrap();
        assert_eq!(resource.ready_handle().unwrap().model_name(), "counting");
    }

    #[test]
    fn test_failed_state_is_sticky() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let loader: OracleLoader = Arc::new(move |_cfg: &ClassifierConfig| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(OracleError::Load("weights missing".to_string()))
        });
        let resource = ClassifierResource::with_loader(config(), loader);

        let first = resource.classify("hello").unwrap_err();
        let second = resource.classify("hello").unwrap_err();

        assert!(matches!(first, ClassifierError::Unavailable(_)));
        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(resource.state(), ResourceState::Failed);
        assert_eq!(resource.describe().unwrap().model_name, config().model_name);
    }

    #[test]
    fn test_batch_drops_invalid_and_keeps_order() {
        let resource = ClassifierResource::new(config());
        let texts: Vec<String> = ["Great!", "", "Terrible.", "   ", "I love it"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for batch_size in [1, 2, 8] {
            let items = resource.classify_batch(&texts, batch_size).unwrap();
            let order: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
            assert_eq!(order, vec!["Great!", "Terrible.", "I love it"]);
            assert_eq!(items[0].label, Label::Positive);
            assert_eq!(items[1].label, Label::Negative);
            assert!(items.iter().all(|i| (0.0..=1.0).contains(&i.score)));
        }
    }

    #[test]
    fn test_batch_errors() {
        let resource = ClassifierResource::new(config());
        assert_eq!(
            resource.classify_batch(&[], 8).unwrap_err(),
            ClassifierError::EmptyBatch
        );
        assert_eq!(
            resource
                .classify_batch(&["".to_string(), "  ".to_string()], 8)
                .unwrap_err(),
            ClassifierError::AllInputsInvalid
        );
    }

    #[test]
    fn test_batch_chunks_by_batch_size() {
        let loads = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let resource = counting_resource(loads, Arc::clone(&calls), DeviceSelection::Cpu);

        let texts: Vec<String> = (0..5).map(|i| format!("t{}", i)).collect();
        let items = resource.classify_batch(&texts, 2).unwrap();

        assert_eq!(items.len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(resource.describe().unwrap().device, DeviceClass::Cpu);
    }

    #[test]
    fn test_classify_all_returns_every_label() {
        let resource = ClassifierResource::new(config());
        let predictions = resource.classify_all("good").unwrap();
        let labels: Vec<_> = predictions.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec![Label::Positive, Label::Negative]);
    }
}
