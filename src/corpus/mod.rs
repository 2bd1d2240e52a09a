// Document corpus
// Built-in sample documents plus loading of JSON corpora from disk


use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::{KbError, Result};

/// Separator placed between a document's title and content before embedding
pub const TITLE_SEPARATOR: &str = "\n\n";

/// A short text document with an externally assigned id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
}

impl Document {
    #[inline]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    /// The text that gets embedded and stored for this document
    #[inline]
    pub fn embedding_text(&self) -> String {
        format!("{}{}{}", self.title, TITLE_SEPARATOR, self.content)
    }
}

/// Read a JSON array of `{id, title, content}` objects
#[inline]
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)?;
    let documents: Vec<Document> = serde_json::from_str(&content).map_err(|e| {
        KbError::InvalidArgument(format!(
            "Failed to parse corpus file {}: {}",
            path.display(),
            e
        ))
    })?;

    validate_documents(&documents)?;
    debug!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Reject empty ids and ids that appear more than once
#[inline]
pub fn validate_documents(documents: &[Document]) -> Result<()> {
    let mut seen = HashSet::with_capacity(documents.len());
    for doc in documents {
        if doc.id.trim().is_empty() {
            return Err(KbError::InvalidArgument(format!(
                "Document '{}' has an empty id",
                doc.title
            )));
        }
        if !seen.insert(doc.id.as_str()) {
            return Err(KbError::InvalidArgument(format!(
                "Duplicate document id: {}",
                doc.id
            )));
        }
    }
    Ok(())
}

/// The built-in knowledge base used when no corpus file is given
#[inline]
pub fn sample_documents() -> Vec<Document> {
    SAMPLE_DOCUMENTS
        .iter()
        .map(|(id, title, content)| Document::new(*id, *title, *content))
        .collect()
}

const SAMPLE_DOCUMENTS: &[(&str, &str, &str)] = &[
    (
        "1",
        "Smart Thermostat Energy Savings",
        "Smart thermostats can reduce home energy consumption by 10-15% annually. By learning your schedule and adjusting temperatures automatically, these devices optimize heating and cooling cycles. Integration with weather forecasts allows preemptive adjustments, maximizing energy savings while maintaining comfort.",
    ),
    (
        "2",
        "LED Lighting Efficiency",
        "LED bulbs use 75% less energy than traditional incandescent lighting. With lifespans of 25,000+ hours, they significantly reduce both energy costs and replacement frequency. Smart LED systems can further optimize energy savings through motion detection and daylight harvesting.",
    ),
    (
        "3",
        "Machine Learning in Healthcare",
        "Machine learning algorithms are revolutionizing medical diagnosis. Deep learning models can detect cancers in medical imaging with accuracy matching specialists. Predictive analytics help identify at-risk patients, enabling preventive interventions and reducing hospital readmissions.",
    ),
    (
        "4",
        "Natural Language Processing Applications",
        "NLP powers chatbots, sentiment analysis, and document summarization. Modern transformer models understand context and nuance in human language. Applications include customer service automation, content moderation, and real-time translation across languages.",
    ),
    (
        "5",
        "Solar Panel ROI Analysis",
        "Residential solar installations typically achieve ROI within 6-8 years. Government incentives and declining panel costs improve energy savings calculations. Net metering allows homeowners to sell excess power back to the grid, accelerating payback periods.",
    ),
    (
        "6",
        "Computer Vision in Manufacturing",
        "AI-powered visual inspection systems detect defects with 99.9% accuracy. Real-time quality control reduces waste and improves production efficiency. Cameras combined with deep learning models identify microscopic flaws invisible to human inspectors.",
    ),
    (
        "7",
        "Building Automation Systems",
        "Integrated building management systems coordinate HVAC, lighting, and security. AI algorithms optimize energy usage based on occupancy patterns. Smart buildings achieve 20-30% energy savings compared to conventional structures through automated efficiency measures.",
    ),
    (
        "8",
        "Recommendation Engines",
        "Collaborative filtering and content-based algorithms power modern recommendation systems. Netflix, Amazon, and Spotify use AI to personalize user experiences. These systems analyze behavior patterns to predict preferences and increase engagement.",
    ),
    (
        "9",
        "Predictive Maintenance with IoT",
        "IoT sensors combined with machine learning predict equipment failures before they occur. Vibration analysis, temperature monitoring, and oil analysis feed predictive models. Companies report 25-30% reduction in maintenance costs and 70% fewer breakdowns.",
    ),
    (
        "10",
        "Electric Vehicle Charging Optimization",
        "Smart charging systems balance grid demand with vehicle charging needs. AI algorithms schedule charging during off-peak hours for maximum energy savings. Vehicle-to-grid technology allows EVs to provide power during peak demand, creating new revenue streams.",
    ),
];
