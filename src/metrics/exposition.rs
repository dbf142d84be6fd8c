//! Text exposition of plot progress

use crate::logwatch::ProgressMap;

pub const DEFAULT_METRIC_NAME: &str = "plot_progress";
pub const DEFAULT_LABEL: &str = "plot";

/// Names used when rendering the progress metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exposition {
    /// Metric name, e.g. `plot_progress`
    pub metric_name: String,
    /// Label carrying the log file name, e.g. `plot`
    pub label: String,
}

impl Default for Exposition {
    fn default() -> Self {
        Self {
            metric_name: DEFAULT_METRIC_NAME.to_string(),
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

impl Exposition {
    /// Render a snapshot: a type line, then one sample per unfinished plot
    pub fn render(&self, progress: &ProgressMap) -> String {
        let mut out = format!("# TYPE {} counter\n", self.metric_name);
        for (name, percent) in progress {
            out.push_str(&format!(
                "{}{{{}=\"{}\"}} {}\n",
                self.metric_name,
                self.label,
                escape_label_value(name),
                percent
            ));
        }
        out
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty() {
        let exposition = Exposition::default();
        assert_eq!(
            exposition.render(&ProgressMap::new()),
            "# TYPE plot_progress counter\n"
        );
    }

    #[test]
    fn test_render_entries() {
        let mut progress = ProgressMap::new();
        progress.insert("plot-a.log".to_string(), 42);
        progress.insert("plot-b.log".to_string(), 98);

        let rendered = Exposition::default().render(&progress);
        let mut lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.remove(0), "# TYPE plot_progress counter");
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "plot_progress{plot=\"plot-a.log\"} 42",
                "plot_progress{plot=\"plot-b.log\"} 98",
            ]
        );
    }

    #[test]
    fn test_render_custom_names() {
        let exposition = Exposition {
            metric_name: "chia_plot_percent".to_string(),
            label: "log".to_string(),
        };
        let mut progress = ProgressMap::new();
        progress.insert("x".to_string(), 1);
        assert_eq!(
            exposition.render(&progress),
            "# TYPE chia_plot_percent counter\nchia_plot_percent{log=\"x\"} 1\n"
        );
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("plain.log"), "plain.log");
        assert_eq!(escape_label_value("a\"b"), "a\\\"b");
        assert_eq!(escape_label_value("a\\b"), "a\\\\b");
        assert_eq!(escape_label_value("a\nb"), "a\\nb");
    }
}
