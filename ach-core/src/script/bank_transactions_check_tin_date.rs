//! Rewrites bank operation dates stored with a space separator
//! (`2018-03-01 00:00:00`) into ISO form (`2018-03-01T00:00:00`).

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{MigrationScript, ScriptReport, ScriptRun};
use crate::contract::{Document, PlatformError};
use crate::diff::diff_attributes;

const DOCTYPE_BANK_TRANSACTIONS: &str = "io.cozy.bank.operations";

const DATE_FIELDS: [&str; 2] = ["date", "dateOperation"];

pub struct BankTransactionsCheckTinDate;

fn has_space_in_date(document: &Document) -> bool {
    matches!(document.attributes.get("date"), Some(Value::String(date)) if date.contains(' '))
}

fn remove_space_from_dates(document: &Document) -> Document {
    let mut updated = document.clone();
    for field in DATE_FIELDS {
        if let Some(Value::String(date)) = updated.attributes.get_mut(field) {
            *date = date.replacen(' ', "T", 1);
        }
    }
    updated
}

#[async_trait]
impl MigrationScript for BankTransactionsCheckTinDate {
    fn name(&self) -> &'static str {
        "bankTransactionsCheckTinDate"
    }

    fn description(&self) -> &'static str {
        "Replace the space separator of bank operation dates with 'T'"
    }

    fn doctypes(&self) -> Vec<String> {
        vec![DOCTYPE_BANK_TRANSACTIONS.to_string()]
    }

    async fn run(&self, run: ScriptRun<'_>) -> Result<ScriptReport, PlatformError> {
        let transactions: Vec<Document> = run
            .platform
            .fetch_all_documents(DOCTYPE_BANK_TRANSACTIONS)
            .await?
            .into_documents()
            .into_iter()
            .filter(has_space_in_date)
            .collect();
        let updated: Vec<Document> = transactions.iter().map(remove_space_from_dates).collect();

        let mut report = ScriptReport::default();
        if run.dry_run {
            if let (Some(current), Some(next)) = (transactions.first(), updated.first()) {
                report
                    .diffs
                    .push(diff_attributes(&current.id, &current.attributes, &next.attributes));
            }
        } else {
            for document in &updated {
                run.platform.update_document(document).await?;
            }
        }

        let verb = if run.dry_run { "Would update" } else { "Has updated" };
        let line = format!(
            "{} {} {} {}",
            run.session.instance(),
            verb,
            transactions.len(),
            DOCTYPE_BANK_TRANSACTIONS
        );
        info!(count = transactions.len(), dry_run = run.dry_run, "{}", line);
        report.lines.push(line);
        Ok(report)
    }
}
