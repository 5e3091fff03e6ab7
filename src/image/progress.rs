use prometheus::{IntCounter, IntGauge, Registry};
use tracing::warn;

/// Read and squash progress of one image, as prometheus metrics.
///
/// Metrics are private to the image until [`ReadProgress::register`] exposes
/// them on a registry.
#[derive(Debug, Clone)]
pub struct ReadProgress {
    total: IntGauge,
    layers_read: IntCounter,
    layers_squashed: IntCounter,
}

impl ReadProgress {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            total: IntGauge::new("layerscope_image_layers_total", "Layers in the image being read")?,
            layers_read: IntCounter::new("layerscope_layers_read_total", "Layer archives parsed")?,
            layers_squashed: IntCounter::new(
                "layerscope_layers_squashed_total",
                "Layer squash trees computed",
            )?,
        })
    }

    /// Expose the metrics on `registry`. Failures are logged and ignored.
    pub fn register(&self, registry: &Registry) {
        let collectors: [Box<dyn prometheus::core::Collector>; 3] = [
            Box::new(self.total.clone()),
            Box::new(self.layers_read.clone()),
            Box::new(self.layers_squashed.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                warn!(error = %e, "Failed to register read progress metric");
            }
        }
    }

    /// Begin a read attempt; counts from an earlier failed attempt are dropped.
    pub(crate) fn start(&self, layers: usize) {
        self.total.set(i64::try_from(layers).unwrap_or(i64::MAX));
        self.layers_read.reset();
        self.layers_squashed.reset();
    }

    pub(crate) fn layer_read(&self) {
        self.layers_read.inc();
    }

    pub(crate) fn layer_squashed(&self) {
        self.layers_squashed.inc();
    }

    /// Number of layers expected.
    pub fn total(&self) -> u64 {
        u64::try_from(self.total.get()).unwrap_or(0)
    }

    pub fn layers_read(&self) -> u64 {
        self.layers_read.get()
    }

    pub fn layers_squashed(&self) -> u64 {
        self.layers_squashed.get()
    }

    /// True once every layer has been read and squashed.
    pub fn is_complete(&self) -> bool {
        let total = self.total();
        self.layers_read() >= total && self.layers_squashed() >= total
    }
}
