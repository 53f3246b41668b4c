use std::fmt;
use std::io::{self, Write};

use crate::error::DetectError;
use crate::prediction::PredictionResult;

const BAR_CELLS: usize = 20;
const RECYCLING_TIP: &str =
    "Make sure waste is clean before recycling, and keep each type separate for best results.";

/// Waste types the service is known to return, under either language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasteCategory {
    Cardboard,
    Glass,
    Metal,
    Paper,
    Plastic,
    Organic,
    Residual,
}

impl WasteCategory {
    const ALIASES: [(WasteCategory, &'static [&'static str]); 7] = [
        (WasteCategory::Cardboard, &["cardboard", "kardus"]),
        (WasteCategory::Glass, &["glass", "kaca"]),
        (WasteCategory::Metal, &["metal", "logam", "kaleng"]),
        (WasteCategory::Paper, &["paper", "kertas"]),
        (WasteCategory::Plastic, &["plastic", "plastik"]),
        (WasteCategory::Organic, &["organic", "organik"]),
        (WasteCategory::Residual, &["trash", "residu"]),
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        Self::ALIASES
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|alias| label.contains(alias)))
            .map(|(category, _)| *category)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            WasteCategory::Cardboard => "Cardboard waste",
            WasteCategory::Glass => "Glass waste",
            WasteCategory::Metal => "Metal waste",
            WasteCategory::Paper => "Paper waste",
            WasteCategory::Plastic => "Plastic waste",
            WasteCategory::Organic => "Organic waste",
            WasteCategory::Residual => "Residual waste",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            WasteCategory::Cardboard => "📦",
            WasteCategory::Glass => "🥃",
            WasteCategory::Metal => "🥫",
            WasteCategory::Paper => "📄",
            WasteCategory::Plastic => "🥤",
            WasteCategory::Organic => "🍎",
            WasteCategory::Residual => "🗑️",
        }
    }
}

/// Everything needed to draw a classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    pub icon: &'static str,
    pub heading: &'static str,
    pub label: String,
    pub confidence: Option<String>,
    pub confidence_bar: Option<String>,
    pub description: String,
    pub steps: Vec<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorView {
    pub message: String,
    pub hint: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Result(ResultView),
    Error(ErrorView),
}

pub fn present(result: &PredictionResult) -> View {
    let category = WasteCategory::from_label(&result.label);
    let confidence = result.confidence.filter(|c| c.is_finite());
    let note = result.recommendation.note.trim();

    View::Result(ResultView {
        icon: category.map_or("♻️", WasteCategory::icon),
        heading: category.map_or("Detected waste", WasteCategory::display_name),
        label: result.label.clone(),
        confidence: confidence.map(format_confidence),
        confidence_bar: confidence.map(confidence_bar),
        description: result.recommendation.description.clone(),
        steps: result.recommendation.steps.clone(),
        // "-" is the service's placeholder for "nothing to add"
        note: (!note.is_empty() && note != "-").then(|| result.recommendation.note.clone()),
    })
}

pub fn present_error(error: &DetectError) -> View {
    let hint = match error {
        DetectError::BackendUnreachable { .. } => "Start the prediction service, then try again.",
        DetectError::CameraUnavailable(_) => {
            "Check camera permissions and that no other application is using it."
        }
        DetectError::InvalidFileType { .. } | DetectError::FileTooLarge { .. } => {
            "Choose a JPG, PNG or WebP image under 10MB."
        }
        DetectError::InvalidTransition { .. } => "Wait for the current detection to finish.",
        _ => "Select an image or reopen the camera to try again.",
    };

    View::Error(ErrorView {
        message: error.to_string(),
        hint,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    /// The prediction as received, or `{"error": ".."}`
    Json,
}

pub fn write_outcome<W: Write>(
    out: &mut W,
    outcome: Result<&PredictionResult, &DetectError>,
    format: OutputFormat,
) -> io::Result<()> {
    match (format, outcome) {
        (OutputFormat::Text, Ok(result)) => writeln!(out, "{}", present(result)),
        (OutputFormat::Text, Err(error)) => writeln!(out, "{}", present_error(error)),
        (OutputFormat::Json, Ok(result)) => {
            writeln!(out, "{}", serde_json::to_string_pretty(result)?)
        }
        (OutputFormat::Json, Err(error)) => {
            let body = serde_json::json!({ "error": error.to_string() });
            writeln!(out, "{}", serde_json::to_string_pretty(&body)?)
        }
    }
}

fn format_confidence(confidence: f64) -> String {
    let confidence = confidence.clamp(0.0, 100.0);
    if confidence.fract() == 0.0 {
        format!("{:.0}%", confidence)
    } else {
        format!("{:.1}%", confidence)
    }
}

fn confidence_bar(confidence: f64) -> String {
    let filled = ((confidence.clamp(0.0, 100.0) / 100.0) * BAR_CELLS as f64).round() as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(BAR_CELLS - filled))
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Result(view) => fmt::Display::fmt(view, f),
            View::Error(view) => fmt::Display::fmt(view, f),
        }
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}  {}", self.icon, self.heading)?;
        writeln!(f, "   Label:      {}", self.label)?;
        if let (Some(confidence), Some(bar)) = (&self.confidence, &self.confidence_bar) {
            writeln!(f, "   Confidence: {} {}", confidence, bar)?;
        }

        if !self.description.is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", self.description)?;
        }

        if !self.steps.is_empty() {
            writeln!(f)?;
            writeln!(f, "Handling steps:")?;
            for (i, step) in self.steps.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, step)?;
            }
        }

        if let Some(note) = &self.note {
            writeln!(f)?;
            writeln!(f, "Note: {}", note)?;
        }

        writeln!(f)?;
        write!(f, "Tip: {}", RECYCLING_TIP)
    }
}

impl fmt::Display for ErrorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "⚠️  Error: {}", self.message)?;
        write!(f, "   {}", self.hint)
    }
}
