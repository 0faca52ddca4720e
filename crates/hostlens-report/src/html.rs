//! Static HTML report assembly.

// Allow format string pushing for readability in markup builders
#![allow(clippy::format_push_string)]

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::chart::escape_markup;
use crate::error::Result;

/// A chart embedded in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Figure {
    /// Section heading.
    pub heading: String,
    /// Image path relative to the report document.
    pub src: String,
    /// Caption under the image, e.g. fitted metrics.
    pub caption: String,
}

/// One-page report document.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlReport {
    title: String,
    generated_at: DateTime<Utc>,
    meta: Vec<(String, String)>,
    figures: Vec<Figure>,
}

impl HtmlReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(title: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            generated_at,
            meta: Vec::new(),
            figures: Vec::new(),
        }
    }

    /// Adds a key/value pair to the header line.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.push((key.into(), value.into()));
        self
    }

    /// Appends a figure.
    #[must_use]
    pub fn with_figure(mut self, figure: Figure) -> Self {
        self.figures.push(figure);
        self
    }

    /// Renders the document.
    #[must_use]
    pub fn render(&self) -> String {
        let title = escape_markup(&self.title);
        let mut html = String::new();
        html.push_str("<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{title}</title>\n"));
        html.push_str(STYLE);
        html.push_str("</head><body>\n\n");
        html.push_str(&format!("<h1>{title}</h1>\n"));

        let mut meta: Vec<String> = self
            .meta
            .iter()
            .map(|(k, v)| format!("<b>{}:</b> {}", escape_markup(k), escape_markup(v)))
            .collect();
        meta.push(format!(
            "<b>Generated:</b> {}",
            self.generated_at.format("%Y-%m-%dT%H:%M:%SZ")
        ));
        html.push_str(&format!("<p class=\"meta\">{}</p>\n\n", meta.join(" &nbsp;|&nbsp; ")));

        html.push_str(OVERVIEW);

        html.push_str("<h2>Results</h2>\n");
        for (i, figure) in self.figures.iter().enumerate() {
            html.push_str(&format!(
                "<h3>{}. {}</h3>\n<img src=\"{}\" alt=\"{}\">\n",
                i + 1,
                escape_markup(&figure.heading),
                escape_markup(&figure.src),
                escape_markup(&figure.heading)
            ));
            if !figure.caption.is_empty() {
                html.push_str(&format!("<p class=\"caption\">{}</p>\n", escape_markup(&figure.caption)));
            }
        }

        html.push_str(ENDPOINTS);
        html.push_str("</body></html>\n");
        html
    }

    /// Writes the document to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("html.tmp");
        fs::write(&tmp, self.render())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

const STYLE: &str = "<style>
  body { font-family: Arial, sans-serif; max-width: 980px; margin: auto; line-height: 1.42; }
  h1,h2 { margin-top: 24px; }
  img { max-width: 100%; border: 1px solid #ddd; padding: 4px; background: #fff; }
  code { background: #f5f5f5; padding: 2px 4px; border-radius: 3px; }
  .meta, .caption { color: #444; }
</style>
";

const OVERVIEW: &str = "<h2>Overview</h2>
<ul>
  <li><b>Collection:</b> CPU %, memory % and 1/5/15 minute load averages sampled on a fixed interval into SQLite.</li>
  <li><b>Forecast:</b> linear regression on lagged CPU values, evaluated on the most recent 20% of the window (MAE, R&sup2;).</li>
  <li><b>Anomalies:</b> isolation forest over all five features; flagged rows are marked on the CPU series.</li>
  <li><b>Clusters:</b> k-means over standardized features, plotted as CPU % against memory %.</li>
</ul>
";

const ENDPOINTS: &str = "<h2>Endpoints</h2>
<ul>
  <li>Health: <code>GET /healthz</code></li>
  <li>Metadata: <code>GET /about</code></li>
  <li>Latest samples: <code>GET /metrics</code></li>
  <li>Regenerate this page: <code>POST /snapshot</code></li>
</ul>
";
