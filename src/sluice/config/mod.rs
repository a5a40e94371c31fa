/*!
# Source Configuration

Declarative configuration for stream sources, loadable from YAML. A
[`SourceSpec`] carries the textual forms exactly as written in the
configuration file; window validation happens when the spec is turned into a
[`StreamSource`](crate::sluice::stream::source::StreamSource) and
`validate()` runs, so a malformed window string blocks startup with a
descriptive message instead of reaching the ingest path.

```yaml
sources:
  - alias: mystream
    query: select * from wrapper
    history-size: 3s
    slide-value: 2s
    wrapper: thermo-probe
```
*/

use crate::sluice::error::{SluiceError, SluiceResult};
use crate::sluice::stream::source::StreamSource;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_sampling_rate() -> f64 {
    1.0
}

/// One stream-source entry of a configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Logical name used in the owning virtual-sensor query
    pub alias: String,
    /// Underlying select query against the wrapper's output
    pub query: String,
    /// Textual history bound: `<n>` tuples or `<n>s` seconds
    #[serde(rename = "history-size")]
    pub history_size: String,
    /// Optional textual slide value, same grammar
    #[serde(rename = "slide-value", default)]
    pub slide_value: Option<String>,
    /// Share of tuples accepted by ingest, in `[0, 1]`
    #[serde(rename = "sampling-rate", default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Name of the wrapper this source binds to
    #[serde(default)]
    pub wrapper: Option<String>,
}

impl SourceSpec {
    /// Build the (not yet validated) stream source for this entry.
    pub fn into_source(self) -> StreamSource {
        let mut source = StreamSource::new(self.alias, self.query)
            .with_raw_history_size(self.history_size)
            .with_sampling_rate(self.sampling_rate);
        if let Some(slide) = self.slide_value {
            source = source.with_raw_slide_value(slide);
        }
        if let Some(wrapper) = self.wrapper {
            source = source.with_wrapper(wrapper);
        }
        source
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SluiceConfig {
    pub sources: Vec<SourceSpec>,
}

impl SluiceConfig {
    /// Parse a configuration document from YAML text.
    pub fn from_yaml_str(yaml: &str) -> SluiceResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            SluiceError::configuration(format!("invalid configuration: {}", e), None)
        })
    }

    /// Load a configuration document from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> SluiceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SluiceError::configuration(
                format!("cannot read '{}': {}", path.display(), e),
                None,
            )
        })?;
        Self::from_yaml_str(&text)
    }

    /// Turn every entry into a validated stream source. The first malformed
    /// entry fails the whole load, so a bad configuration never partially
    /// activates.
    pub fn into_sources(self) -> SluiceResult<Vec<StreamSource>> {
        self.sources
            .into_iter()
            .map(|spec| {
                let mut source = spec.into_source();
                source.validate()?;
                Ok(source)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sluice::window::spec::WindowType;

    const SAMPLE: &str = r#"
sources:
  - alias: mystream
    query: select * from wrapper
    history-size: 3s
    slide-value: 2s
  - alias: counts
    query: select * from wrapper
    history-size: "20"
"#;

    #[test]
    fn test_yaml_round_trip_to_sources() {
        let config = SluiceConfig::from_yaml_str(SAMPLE).unwrap();
        let sources = config.into_sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].windowing_type(), Some(WindowType::TimeBased));
        assert_eq!(sources[1].windowing_type(), Some(WindowType::TupleBased));
        assert_eq!(sources[1].sampling_rate(), 1.0);
    }

    #[test]
    fn test_malformed_window_fails_whole_load() {
        let yaml = r#"
sources:
  - alias: good
    query: select * from wrapper
    history-size: 2s
  - alias: bad
    query: select * from wrapper
    history-size: 10m
"#;
        let config = SluiceConfig::from_yaml_str(yaml).unwrap();
        assert!(config.into_sources().is_err());
    }

    #[test]
    fn test_missing_history_is_a_parse_error() {
        let yaml = r#"
sources:
  - alias: nohistory
    query: select * from wrapper
"#;
        assert!(SluiceConfig::from_yaml_str(yaml).is_err());
    }
}
