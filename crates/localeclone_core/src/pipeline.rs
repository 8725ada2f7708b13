use std::collections::BTreeSet;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{
    ContentReadApi, CreateOutcome, MigrationClient, MigrationWriteApi, PrismicContentClient,
};
use crate::checkpoint::{ReleaseCheckpoint, TerminalCheckpoint};
use crate::config::CloneConfig;
use crate::document::Document;
use crate::mapping::{IdMapping, IdMappingEntry};
use crate::rewrite::{document_link_targets, localize_document, relink_document};

/// A migration release holds at most this many documents.
pub const RELEASE_DOCUMENT_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CloneStatus {
    Completed,
    StoppedAtCheckpoint { batch: usize, total_batches: usize },
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    pub status: CloneStatus,
    pub target_locale: String,
    pub fetched: usize,
    pub batches: usize,
    pub created: usize,
    pub empty_ids: usize,
    pub cleared_integrations: usize,
    pub link_references: usize,
    pub unresolved_links: Vec<String>,
    pub rewritten_links: usize,
    pub updated: usize,
    pub update_failures: usize,
    pub request_count: usize,
    /// Source id to created id, in fetch order.
    pub mapping: Vec<IdMappingEntry>,
}

impl CloneReport {
    fn new(config: &CloneConfig, status: CloneStatus) -> Self {
        Self {
            status,
            target_locale: config.target_locale.clone(),
            fetched: 0,
            batches: 0,
            created: 0,
            empty_ids: 0,
            cleared_integrations: 0,
            link_references: 0,
            unresolved_links: Vec::new(),
            rewritten_links: 0,
            updated: 0,
            update_failures: 0,
            request_count: 0,
            mapping: Vec::new(),
        }
    }
}

pub fn clone_locale(config: &CloneConfig, options: &CloneOptions) -> Result<CloneReport> {
    let mut reader = PrismicContentClient::new(config)?;
    if options.dry_run {
        return dry_run_with_api(config, &mut reader);
    }
    let mut writer = MigrationClient::new(config)?;
    let mut checkpoint = TerminalCheckpoint::stdin();
    clone_locale_with_api(config, &mut reader, &mut writer, &mut checkpoint)
}

/// Every published document of the master locale, in listing order.
pub fn fetch_source_documents<R: ContentReadApi>(
    reader: &mut R,
    page_size: usize,
) -> Result<Vec<Document>> {
    let reference = reader
        .master_ref()
        .context("failed to resolve the published content ref")?;
    debug!(reference = %reference, "resolved master ref");

    let mut documents = Vec::new();
    let mut page = 1;
    loop {
        let listing = reader
            .search_documents(&reference, page, page_size)
            .with_context(|| format!("failed to fetch document page {page}"))?;
        let received = listing.results.len();
        documents.extend(listing.results);
        debug!(page, total_pages = listing.total_pages, received, "fetched document page");
        if received == 0 || listing.page >= listing.total_pages {
            break;
        }
        page = listing.page + 1;
    }
    info!(documents = documents.len(), "fetched source documents");
    Ok(documents)
}

fn clone_locale_with_api<R, W, C>(
    config: &CloneConfig,
    reader: &mut R,
    writer: &mut W,
    checkpoint: &mut C,
) -> Result<CloneReport>
where
    R: ContentReadApi,
    W: MigrationWriteApi,
    C: ReleaseCheckpoint,
{
    let mut report = CloneReport::new(config, CloneStatus::Completed);
    let mut documents = fetch_source_documents(reader, config.page_size)?;
    report.fetched = documents.len();
    warn_release_limit(documents.len());
    let mut mapping = IdMapping::for_documents(&documents)?;

    writer
        .login(&config.email, &config.password)
        .context("failed to authenticate against the migration API")?;
    info!("authenticated");

    for document in &mut documents {
        report.cleared_integrations += localize_document(document, &config.target_locale);
    }

    let total_batches = config.batch_count(documents.len());
    for (index, batch) in documents.chunks(config.batch_size).enumerate() {
        let batch_number = index + 1;
        info!(batch = batch_number, total_batches, documents = batch.len(), "creating batch");
        for document in batch {
            let outcome = writer
                .create_document(document)
                .with_context(|| format!("failed to create document {}", document.label()))?;
            match outcome {
                CreateOutcome::Created { id } => {
                    if id.is_empty() {
                        warn!(
                            source_id = %document.id,
                            "created document {} but the API returned an empty id",
                            document.label()
                        );
                        report.empty_ids += 1;
                    } else {
                        info!(source_id = %document.id, new_id = %id, "created {}", document.label());
                    }
                    mapping.record_created(&document.id, &id)?;
                    pause(config.create_delay_ms);
                }
                CreateOutcome::Rejected { status, body } => bail!(
                    "failed to create document {}: HTTP {status}: {body}",
                    document.label()
                ),
            }
        }
        report.batches = batch_number;

        let confirmed = checkpoint
            .confirm_release_published(batch_number, total_batches)
            .context("failed to read release confirmation")?;
        if !confirmed {
            info!(batch = batch_number, "stopped at release checkpoint");
            report.created = mapping.created_count();
            report.mapping = mapping.entries().to_vec();
            report.status = CloneStatus::StoppedAtCheckpoint {
                batch: batch_number,
                total_batches,
            };
            report.request_count = reader.request_count() + writer.request_count();
            return Ok(report);
        }
    }

    report.created = mapping.created_count();
    report.mapping = mapping.entries().to_vec();
    for entry in &report.mapping {
        debug!(old_id = %entry.old_id, new_id = %entry.new_id, "{}", entry.label);
    }

    for document in &mut documents {
        report.rewritten_links += relink_document(document, &mapping)?;
    }
    info!(links = report.rewritten_links, "rewrote document links");

    for document in &documents {
        let outcome = writer
            .update_document(document)
            .with_context(|| format!("failed to update document {}", document.label()))?;
        if outcome.accepted {
            debug!(id = %document.id, "updated {}", document.label());
            report.updated += 1;
        } else {
            warn!(
                id = %document.id,
                status = outcome.status,
                "update of {} was not accepted: {}",
                document.label(),
                outcome.body
            );
            report.update_failures += 1;
        }
        pause(config.update_delay_ms);
    }

    report.request_count = reader.request_count() + writer.request_count();
    Ok(report)
}

/// Fetch and rewrite without writing anything: counts what a real run would
/// touch and lists link targets outside the fetched set.
fn dry_run_with_api<R: ContentReadApi>(config: &CloneConfig, reader: &mut R) -> Result<CloneReport> {
    let mut report = CloneReport::new(config, CloneStatus::DryRun);
    let mut documents = fetch_source_documents(reader, config.page_size)?;
    report.fetched = documents.len();
    report.batches = config.batch_count(documents.len());
    warn_release_limit(documents.len());
    let mapping = IdMapping::for_documents(&documents)?;

    let mut unresolved = BTreeSet::new();
    for document in &mut documents {
        report.cleared_integrations += localize_document(document, &config.target_locale);
        for target in document_link_targets(document) {
            report.link_references += 1;
            if !mapping.contains(&target) {
                unresolved.insert(target);
            }
        }
    }
    report.unresolved_links = unresolved.into_iter().collect();
    if !report.unresolved_links.is_empty() {
        warn!(
            count = report.unresolved_links.len(),
            "links point at documents outside the published set; a real run would fail at relinking"
        );
    }
    report.request_count = reader.request_count();
    Ok(report)
}

fn warn_release_limit(documents: usize) {
    if documents > RELEASE_DOCUMENT_LIMIT {
        warn!(
            documents,
            limit = RELEASE_DOCUMENT_LIMIT,
            "more documents than a single migration release can hold; publish after every batch"
        );
    }
}

fn pause(delay_ms: u64) {
    if delay_ms > 0 {
        sleep(Duration::from_millis(delay_ms));
    }
}
