use std::fs;

use serde::Deserialize;

use crate::errors::{ErrorDetails, ErrorLayer, LockGraphError, Result};

/// Knobs for the text and DOT reports.  Every field is optional in a config
/// file; missing ones take the defaults below.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Stack pairs printed per edge before eliding the rest.
    pub max_stack_pairs: usize,
    /// Prefix put in front of every stack line in the text report.
    pub indent: String,
    /// Stripped from lock class labels for display.
    pub label_prefix: String,
    /// Every goroutine stack bottoms out in this function, so it is dropped
    /// from the outer end of stacks before drawing call graphs.
    pub exit_function: String,
    /// Error text of the frame that stands in for an empty stack.
    pub missing_stack: String,
    pub min_pen_width: f64,
    pub max_pen_width: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            max_stack_pairs: 5,
            indent: "    ".to_string(),
            label_prefix: "runtime.".to_string(),
            exit_function: "runtime.goexit".to_string(),
            missing_stack: "missing stack".to_string(),
            min_pen_width: 1.0,
            max_pen_width: 8.0,
        }
    }
}

/// Parses a TOML report config.
pub fn parse(text: &str) -> Result<ReportConfig> {
    let config: ReportConfig = toml::from_str(text)?;
    if config.min_pen_width > config.max_pen_width {
        return Err(LockGraphError::Decode(ErrorDetails {
            layer: ErrorLayer::Config,
            message: format!(
                "min_pen_width {} exceeds max_pen_width {}",
                config.min_pen_width, config.max_pen_width
            ),
        }));
    }
    Ok(config)
}

pub fn load(path: &str) -> Result<ReportConfig> {
    let text = fs::read_to_string(path).map_err(|e| {
        LockGraphError::Io(ErrorDetails {
            layer: ErrorLayer::Config,
            message: format!("{}: {}", path, e),
        })
    })?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = parse("max_stack_pairs = 2\nlabel_prefix = \"sync.\"\n").unwrap();
        assert_eq!(config.max_stack_pairs, 2);
        assert_eq!(config.label_prefix, "sync.");
        assert_eq!(config.exit_function, "runtime.goexit");
        assert_eq!(config.indent, "    ");
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse("").unwrap(), ReportConfig::default());
    }

    #[test]
    fn test_bad_configs() {
        assert_eq!(
            parse("max_stack_pairs = \"many\"").unwrap_err().layer(),
            ErrorLayer::Config
        );
        assert_eq!(parse("colour = 1").unwrap_err().layer(), ErrorLayer::Config);
        assert_eq!(
            parse("min_pen_width = 9.0").unwrap_err().layer(),
            ErrorLayer::Config
        );
        assert_eq!(
            load("/nonexistent/lockgraph.toml").unwrap_err().layer(),
            ErrorLayer::Config
        );
    }
}
