//! Contact CSV input/output.
//!
//! Column names are detected case-insensitively from a fixed alias list; the
//! output keeps every input column and appends (or overwrites) the enrichment
//! columns.

use csv::StringRecord;
use std::io::{Read, Write};
use std::path::Path;

use crate::errors::{AppError, ResultExt};
use crate::models::{Contact, EnrichmentOutcome};

const NAME_ALIASES: &[&str] = &["full name", "full_name", "name", "fullname"];
const DOMAIN_ALIASES: &[&str] = &["domain", "company website", "website", "company_domain"];
const COMPANY_ALIASES: &[&str] = &[
    "company",
    "company name",
    "company_name",
    "org",
    "organization",
];
const EMAIL_ALIASES: &[&str] = &["email", "email business", "email_business", "work_email"];
const FIRST_NAME_ALIASES: &[&str] = &["first name", "first_name", "firstname"];

pub const COL_FIRST_NAME: &str = "First Name";
pub const COL_COMPANY_CLEAN: &str = "Company Name Clean";
pub const COL_VALID_EMAIL: &str = "Valid Email";
pub const COL_EMAIL_HOST: &str = "Email Host";
pub const COL_EMAIL_SOURCE: &str = "Email Source";
pub const COL_EMAIL_QUALITY: &str = "Email Quality";
pub const COL_FAILURE_REASON: &str = "Failure Reason";

const OUTPUT_COLUMNS: [&str; 7] = [
    COL_FIRST_NAME,
    COL_COMPANY_CLEAN,
    COL_VALID_EMAIL,
    COL_EMAIL_HOST,
    COL_EMAIL_SOURCE,
    COL_EMAIL_QUALITY,
    COL_FAILURE_REASON,
];

/// Strips scheme, `www.` and trailing slashes and lower-cases a domain.
pub fn clean_domain(raw: &str) -> String {
    let domain = raw.trim().to_lowercase();
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(&domain);
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    domain.trim_end_matches('/').to_string()
}

/// Indices of the columns the waterfall reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub full_name: Option<usize>,
    pub first_name: Option<usize>,
    pub domain: Option<usize>,
    pub company: Option<usize>,
    pub email: Option<usize>,
}

impl ColumnMap {
    pub fn detect(headers: &StringRecord) -> Self {
        let find = |aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
        };

        Self {
            full_name: find(NAME_ALIASES),
            first_name: find(FIRST_NAME_ALIASES),
            domain: find(DOMAIN_ALIASES),
            company: find(COMPANY_ALIASES),
            email: find(EMAIL_ALIASES),
        }
    }
}

/// A parsed contact CSV: original headers and rows plus detected columns.
#[derive(Debug, Clone)]
pub struct ContactTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    columns: ColumnMap,
}

impl ContactTable {
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open input CSV {}", path.display()))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader.headers().context("Failed to read CSV headers")?.clone();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read CSV rows")?;
        let columns = ColumnMap::detect(&headers);

        tracing::info!(
            "Detected columns: name={:?}, domain={:?}, company={:?}, email={:?}, first_name={:?}",
            columns.full_name.and_then(|i| headers.get(i)),
            columns.domain.and_then(|i| headers.get(i)),
            columns.company.and_then(|i| headers.get(i)),
            columns.email.and_then(|i| headers.get(i)),
            columns.first_name.and_then(|i| headers.get(i)),
        );

        Ok(Self {
            headers,
            rows,
            columns,
        })
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps only the first `limit` rows.
    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
    }

    /// Contacts in row order.
    pub fn contacts(&self) -> Vec<Contact> {
        self.rows.iter().map(|row| self.contact_from_row(row)).collect()
    }

    fn contact_from_row(&self, row: &StringRecord) -> Contact {
        let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("").trim();

        let mut contact = Contact::new(
            field(self.columns.full_name),
            clean_domain(field(self.columns.domain)),
            field(self.columns.company),
        )
        .with_email(field(self.columns.email));

        let first_name = field(self.columns.first_name);
        if !first_name.is_empty() {
            contact = contact.with_first_name(first_name);
        }
        contact
    }

    /// Writes every input row with its outcome's enrichment columns.
    ///
    /// `outcomes` must be in row order; rows without an outcome get empty
    /// enrichment columns.
    pub fn write_enriched<W: Write>(
        &self,
        writer: W,
        outcomes: &[EnrichmentOutcome],
    ) -> Result<(), AppError> {
        if outcomes.len() != self.rows.len() {
            tracing::warn!(
                "Writing {} rows with {} outcomes; unmatched rows get empty enrichment columns",
                self.rows.len(),
                outcomes.len()
            );
        }

        let mut headers: Vec<String> = self.headers.iter().map(str::to_string).collect();
        let mut output_index = Vec::with_capacity(OUTPUT_COLUMNS.len());
        for column in OUTPUT_COLUMNS {
            match headers.iter().position(|h| h == column) {
                Some(idx) => output_index.push(idx),
                None => {
                    headers.push(column.to_string());
                    output_index.push(headers.len() - 1);
                }
            }
        }

        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(&headers)
            .context("Failed to write CSV header")?;

        for (row_idx, row) in self.rows.iter().enumerate() {
            let mut record: Vec<String> = row.iter().map(str::to_string).collect();
            record.resize(headers.len(), String::new());

            if let Some(outcome) = outcomes.get(row_idx) {
                let values = enrichment_values(outcome);
                for (column_idx, value) in output_index.iter().zip(values) {
                    record[*column_idx] = value;
                }
            }

            writer
                .write_record(&record)
                .with_context(|| format!("Failed to write CSV row {}", row_idx + 1))?;
        }

        writer.flush().context("Failed to flush CSV output")?;
        Ok(())
    }

    pub fn write_enriched_to_path(
        &self,
        path: &Path,
        outcomes: &[EnrichmentOutcome],
    ) -> Result<(), AppError> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create output CSV {}", path.display()))?;
        self.write_enriched(file, outcomes)
    }
}

fn enrichment_values(outcome: &EnrichmentOutcome) -> [String; 7] {
    [
        outcome.first_name_clean.clone(),
        outcome.company_name_clean.clone(),
        outcome.valid_email.clone().unwrap_or_default(),
        outcome.esp_host.clone().unwrap_or_default(),
        outcome
            .email_source
            .map(|s| s.to_string())
            .unwrap_or_default(),
        outcome
            .quality
            .map(|q| q.as_str().to_string())
            .unwrap_or_default(),
        outcome
            .failure
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_default(),
    ]
}
