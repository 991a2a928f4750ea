//! Metrics dataset families and their column registries
//!
//! A [`Source`] is parsed once at the boundary; everything downstream works
//! with the closed variant and the [`SourceSchema`] it maps to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::PortalError;

pub const TENANT_COL: &str = "TenantId";
pub const ASSESSMENT_COL: &str = "AssessmentId";
pub const NOTE_TYPE_COL: &str = "Note_Type";
pub const HOSPITAL_COL: &str = "Notes";
pub const ACCURACY_COL: &str = "Accuracy";
pub const FILE_NAME_COL: &str = "File_Name";
/// Derived per identity when a table is loaded
pub const FILE_LINK_COL: &str = "File_Name_URL";

/// Columns holding identifiers; kept verbatim even when they look numeric
pub const IDENTIFIER_COLUMNS: [&str; 3] = [TENANT_COL, ASSESSMENT_COL, FILE_NAME_COL];

/// Metrics dataset family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Similarity-scored assessment metrics
    Saas,
    /// Multi-score (BLEU, cosine, ROUGE, METEOR) assessment metrics
    Opas,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Saas => "saas",
            Source::Opas => "opas",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "saas" => Ok(Source::Saas),
            "opas" => Ok(Source::Opas),
            _ => Err(PortalError::InvalidRequest(format!(
                "Unknown metrics source: {}",
                s
            ))),
        }
    }
}

/// Which column the third filter narrows on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationFilter {
    /// Hospital names from the `Notes` column
    Hospital,
    /// Tenant identifiers from the `TenantId` column
    Tenant,
}

impl LocationFilter {
    pub fn column(&self) -> &'static str {
        match self {
            LocationFilter::Hospital => HOSPITAL_COL,
            LocationFilter::Tenant => TENANT_COL,
        }
    }

    pub fn all_label(&self) -> &'static str {
        match self {
            LocationFilter::Hospital => "All Hospitals",
            LocationFilter::Tenant => "All Tenants",
        }
    }
}

/// Display label for one column, in registry order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLabel {
    pub column: String,
    pub label: String,
}

impl ColumnLabel {
    fn new(column: &str, label: &str) -> Self {
        Self {
            column: column.to_string(),
            label: label.to_string(),
        }
    }
}

/// Everything the pipeline needs to know about one source's table shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Column labels; order here is on-screen order
    pub labels: Vec<ColumnLabel>,

    /// Columns shown as one-decimal percentages
    #[serde(default)]
    pub percent_columns: Vec<String>,

    /// Columns shown as plain numbers
    #[serde(default)]
    pub number_columns: Vec<String>,

    /// Columns every row must carry
    pub required_columns: Vec<String>,

    /// Column averaged in the summary
    pub score_column: String,

    /// Third filter dimension
    pub location_filter: LocationFilter,
}

fn common_labels() -> Vec<ColumnLabel> {
    vec![
        ColumnLabel::new(FILE_LINK_COL, "Feedback"),
        ColumnLabel::new(TENANT_COL, "Tenant"),
        ColumnLabel::new(ASSESSMENT_COL, "Assessment"),
        ColumnLabel::new("Physician_Recommendation", "IP/OBS"),
        ColumnLabel::new(NOTE_TYPE_COL, "Note Type"),
        ColumnLabel::new("Dates_Of_Service_Count_File", "Dates of Service Count"),
        ColumnLabel::new("Annotated_Date_Count_File", "Annotated Date Count"),
        ColumnLabel::new("LLM_Date_Count_File", "AI Extracted Date Count"),
        ColumnLabel::new("Total_Words_File", "Total Words"),
        ColumnLabel::new(HOSPITAL_COL, "Hospital"),
    ]
}

fn count_columns() -> Vec<String> {
    [
        "Dates_Of_Service_Count_File",
        "Annotated_Date_Count_File",
        "LLM_Date_Count_File",
        "Total_Words_File",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn required(score_column: &str) -> Vec<String> {
    [TENANT_COL, ASSESSMENT_COL, NOTE_TYPE_COL, HOSPITAL_COL, score_column]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl SourceSchema {
    /// Built-in schema for similarity-scored metrics
    pub fn saas() -> Self {
        let mut labels = common_labels();
        labels.push(ColumnLabel::new("BLEU_Score_File", "Similarity %"));

        Self {
            labels,
            percent_columns: vec!["BLEU_Score_File".to_string()],
            number_columns: count_columns(),
            required_columns: required("BLEU_Score_File"),
            score_column: "BLEU_Score_File".to_string(),
            location_filter: LocationFilter::Hospital,
        }
    }

    /// Built-in schema for multi-score metrics
    pub fn opas() -> Self {
        let scores = [
            ("BLEU_Score_File", "BLEU Score"),
            ("Cosine_Similarity_File", "Cosine Similarity"),
            ("Rouge_Score_File", "Rouge Score"),
            ("Meteor_Score_File", "Meteor Score"),
            ("Cosine_Similarity_Date", "Date Cosine Similarity"),
            ("Rouge_Score_Date", "Date Rouge Score"),
            ("Meteor_Score_Date", "Date Meteor Score"),
        ];

        let mut labels = common_labels();
        let mut number_columns = count_columns();
        for (column, label) in scores {
            labels.push(ColumnLabel::new(column, label));
            number_columns.push(column.to_string());
        }

        Self {
            labels,
            percent_columns: Vec::new(),
            number_columns,
            required_columns: required("BLEU_Score_File"),
            score_column: "BLEU_Score_File".to_string(),
            location_filter: LocationFilter::Tenant,
        }
    }
}

/// Schemas for every source, passed explicitly to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    #[serde(default = "SourceSchema::saas")]
    pub saas: SourceSchema,
    #[serde(default = "SourceSchema::opas")]
    pub opas: SourceSchema,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self {
            saas: SourceSchema::saas(),
            opas: SourceSchema::opas(),
        }
    }
}

impl SchemaRegistry {
    pub fn get(&self, source: Source) -> &SourceSchema {
        match source {
            Source::Saas => &self.saas,
            Source::Opas => &self.opas,
        }
    }
}
