// src/pipeline/generate.rs

//! Sitemap generation pipeline.
//!
//! Hierarchy discovery, then one worker per category draining its
//! subcategory scopes into shards, then index composition and publishing.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    CatalogEntity, Category, Config, Hierarchy, HierarchyOrigin, Layout, PageHints, Scope,
    Subcategory, UrlRecord,
};
use crate::pipeline::summary::{
    CountBasis, CountMismatch, RunSummary, ScopeFailure, SkipReason,
};
use crate::services::{CatalogCursorReader, HierarchyEnumerator};
use crate::sitemap::{
    CategoryOutput, DocumentKind, IndexComposer, Publisher, ROOT_KEY, ShardWriter,
    StagedDocument, SubcategoryOutput, Verifier,
};
use crate::source::{CatalogSource, Governor, RetryPolicy};
use crate::storage::SitemapStorage;
use crate::utils::UrlScheme;

/// Stem of the static pages shard.
pub const STATIC_STEM: &str = "sitemap-pages";

/// Per-run switches that are not part of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Manufacturers to generate; empty means the configured default
    pub manufacturers: Vec<String>,

    /// Plan everything, write nothing
    pub dry_run: bool,

    /// Treat failed scopes, truncation, count mismatches and failed
    /// verification as errors
    pub strict: bool,

    /// Date used for documents without a better `lastmod`; defaults to today (UTC)
    pub today: Option<NaiveDate>,

    /// Checked between scopes
    pub cancel: Arc<AtomicBool>,
}

struct Context<'a> {
    config: &'a Config,
    scheme: &'a UrlScheme,
    reader: &'a CatalogCursorReader,
    publisher: &'a Publisher,
    cancel: &'a AtomicBool,
    capacity: usize,
}

impl Context<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// What one category worker produced.
struct CategoryResult {
    index_key: String,
    output: Option<CategoryOutput>,

    /// Landing pages headed for the static shard (flat layout)
    landing: Vec<UrlRecord>,

    failures: Vec<ScopeFailure>,
    mismatches: Vec<CountMismatch>,
    entities: usize,

    /// Parts left out because an earlier manufacturer listed the same URL
    repeated: usize,

    /// Every URL this category put into a shard
    locations: Vec<String>,
}

enum ScopeOutcome {
    Drained {
        shards: Vec<StagedDocument>,
        entities: usize,
        repeated: usize,
        locations: Vec<String>,
    },
    Failed(ScopeFailure),
}

/// Run the sitemap generator.
///
/// Scope failures are reported in the summary and leave the rest of the tree
/// intact. Sink and configuration errors abort the run without touching the
/// published tree.
pub async fn run_generate(
    config: &Config,
    source: Arc<dyn CatalogSource>,
    storage: Arc<dyn SitemapStorage>,
    options: &GenerateOptions,
) -> Result<RunSummary> {
    let started = Instant::now();
    let today = options.today.unwrap_or_else(|| Utc::now().date_naive());
    let scheme = UrlScheme::new(&config.site)?;

    let policy = RetryPolicy::from_config(&config.retry);
    let governor = Arc::new(Governor::from_config(&config.source));
    let reader = CatalogCursorReader::new(
        Arc::clone(&source),
        policy.clone(),
        Arc::clone(&governor),
        config.source.page_size,
    );
    let enumerator =
        HierarchyEnumerator::new(source, policy, governor, config.hierarchy.clone());

    let mut summary = RunSummary {
        dry_run: options.dry_run,
        ..RunSummary::default()
    };

    let manufacturers = if options.manufacturers.is_empty() {
        vec![config.site.default_manufacturer.clone()]
    } else {
        options.manufacturers.clone()
    };
    log::info!(
        "Generating sitemaps for {} (capacity {}, {:?} layout{})",
        manufacturers.join(", "),
        config.output.shard_capacity,
        config.output.layout,
        if options.dry_run { ", dry run" } else { "" }
    );

    let hierarchies = discover(&enumerator, &manufacturers, &options.cancel, &mut summary).await;

    let publisher = Publisher::open(Arc::clone(&storage), today).await?;
    let ctx = Context {
        config,
        scheme: &scheme,
        reader: &reader,
        publisher: &publisher,
        cancel: &options.cancel,
        capacity: config.output.shard_capacity,
    };

    let expected = match build_and_publish(&ctx, &hierarchies, &mut summary).await {
        Ok(expected) => expected,
        Err(e) => {
            log::error!("Run aborted, published sitemaps left untouched: {}", e);
            publisher.abort().await;
            return Err(e);
        }
    };

    if config.output.verify && !options.dry_run {
        let verifier = Verifier::new(storage.as_ref(), &scheme, config.output.shard_capacity);
        summary.verification = Some(verifier.verify(Some(&expected)).await?);
    }

    summary.elapsed = started.elapsed();
    summary.log();

    if options.strict && summary.strict_failures() > 0 {
        return Err(AppError::PartialFailure {
            failed: summary.strict_failures(),
        });
    }
    Ok(summary)
}

/// Enumerate every requested manufacturer; failures become skipped scopes.
async fn discover(
    enumerator: &HierarchyEnumerator,
    manufacturers: &[String],
    cancel: &AtomicBool,
    summary: &mut RunSummary,
) -> Vec<Hierarchy> {
    let mut slugs = HashSet::new();
    let mut hierarchies = Vec::new();

    for manufacturer in manufacturers {
        let scope = Scope::manufacturer(manufacturer);
        if cancel.load(Ordering::SeqCst) {
            summary.skipped.push(skip(scope, SkipReason::Cancelled));
            continue;
        }

        let mut hierarchy = match enumerator.enumerate_or_fallback(manufacturer).await {
            Ok(hierarchy) => hierarchy,
            Err(e) => {
                log::error!("{}: hierarchy enumeration failed: {}", manufacturer, e);
                summary
                    .skipped
                    .push(skip(scope, SkipReason::HierarchyFailed(e.to_string())));
                continue;
            }
        };

        let slug = hierarchy.manufacturer_slug.clone();
        if slug.is_empty() {
            summary.skipped.push(skip(scope, SkipReason::EmptySlug));
            continue;
        }
        if !slugs.insert(slug.clone()) {
            summary.skipped.push(skip(scope, SkipReason::SlugConflict(slug)));
            continue;
        }

        for conflict in &hierarchy.conflicts {
            for name in &conflict.skipped {
                let scope = match &conflict.parent {
                    Some(category) => Scope::subcategory(manufacturer, category, name),
                    None => Scope::category(manufacturer, name),
                };
                let reason = if conflict.slug.is_empty() {
                    SkipReason::EmptySlug
                } else {
                    SkipReason::SlugConflict(conflict.slug.clone())
                };
                summary.skipped.push(skip(scope, reason));
            }
        }

        match hierarchy.origin {
            HierarchyOrigin::Live => {
                enumerator.attach_counts(&mut hierarchy).await;
                log::info!(
                    "{}: about {} parts expected",
                    manufacturer,
                    hierarchy.estimated_entities()
                );
            }
            HierarchyOrigin::Fallback => summary.fallback.push(manufacturer.clone()),
        }
        if hierarchy.truncated {
            summary.truncated.push(manufacturer.clone());
        }

        summary.manufacturers += 1;
        summary.categories += hierarchy.categories.len();
        summary.subcategories += hierarchy.subcategory_count();
        hierarchies.push(hierarchy);
    }

    hierarchies
}

fn skip(scope: Scope, reason: SkipReason) -> ScopeFailure {
    ScopeFailure {
        scope,
        cursor: None,
        reason,
    }
}

/// Shard every scope, compose the indexes and publish. Returns the URLs
/// that should be reachable from the root.
///
/// Manufacturers are drained one after another, categories of one
/// manufacturer concurrently. A part URL already listed for an earlier
/// manufacturer is not listed again.
async fn build_and_publish(
    ctx: &Context<'_>,
    hierarchies: &[Hierarchy],
    summary: &mut RunSummary,
) -> Result<HashSet<String>> {
    let workers = ctx.config.output.workers.max(1);

    let mut expected = HashSet::new();
    let mut claimed = HashSet::new();
    let mut outputs = Vec::new();
    let mut landing = Vec::new();

    for hierarchy in hierarchies {
        let mut drained = 0;
        let mut partial = false;
        let mut listed = Vec::new();

        let mut results = stream::iter(&hierarchy.categories)
            .map(|category| process_category(ctx, hierarchy, category, &claimed))
            .buffer_unordered(workers);

        while let Some(result) = results.next().await {
            let result = result?;
            drained += result.entities;
            partial |= !result.failures.is_empty();
            summary.entities += result.entities;
            summary.repeated_parts += result.repeated;
            summary.skipped.extend(result.failures);
            summary.mismatches.extend(result.mismatches);
            listed.extend(result.locations);
            match result.output {
                Some(output) => {
                    if !result.landing.is_empty() {
                        landing.push((
                            (output.manufacturer_slug.clone(), output.slug.clone()),
                            result.landing,
                        ));
                    }
                    outputs.push(output);
                }
                None => {
                    log::warn!("{}: every subcategory failed; category omitted", result.index_key);
                    summary.omitted_categories.push(result.index_key);
                }
            }
        }
        drop(results);

        if !partial {
            summary
                .mismatches
                .extend(reconcile_manufacturer(hierarchy, drained));
        }
        claimed.extend(listed.iter().cloned());
        expected.extend(listed);
    }

    // Static pages, then flat-layout landing pages in slug order.
    let mut records = static_records(ctx)?;
    landing.sort_by(|a, b| a.0.cmp(&b.0));
    records.extend(landing.into_iter().flat_map(|(_, records)| records));
    expected.extend(records.iter().map(|r| r.location.clone()));

    let mut writer = ShardWriter::new(ctx.publisher, STATIC_STEM, ctx.capacity);
    writer.extend(records).await?;
    let static_shards = writer.finish().await?;

    let composer = IndexComposer::new(
        ctx.publisher,
        ctx.scheme,
        ctx.config.output.layout,
        ctx.capacity,
    );
    let composition = composer.compose(&static_shards, outputs).await?;
    summary.omitted_categories.extend(composition.omitted);

    summary.cancelled = ctx.cancelled();
    summary.publish = ctx
        .publisher
        .commit(ROOT_KEY, summary.is_complete(), ctx.config.output.prune_stale)
        .await?;
    summary.url_records = ctx
        .publisher
        .staged()
        .iter()
        .filter(|d| d.kind == DocumentKind::UrlSet)
        .map(|d| d.records)
        .sum();

    Ok(expected)
}

/// Compare a fully drained manufacturer with the non-blank rows its
/// hierarchy scan saw. Only meaningful for a complete live scan with
/// nothing skipped.
fn reconcile_manufacturer(hierarchy: &Hierarchy, drained: usize) -> Option<CountMismatch> {
    let skipped = hierarchy.conflicts.iter().any(|c| !c.skipped.is_empty());
    if hierarchy.origin != HierarchyOrigin::Live || hierarchy.truncated || skipped {
        return None;
    }
    let expected = (hierarchy.rows_scanned - hierarchy.blank_rows) as u64;
    let drained = drained as u64;
    (expected != drained).then(|| CountMismatch {
        scope: Scope::manufacturer(&hierarchy.manufacturer),
        basis: CountBasis::Enumerated,
        expected,
        drained,
    })
}

/// Compare one drained subcategory with its enumerated rows and count query.
fn reconcile_subcategory(
    hierarchy: &Hierarchy,
    sub: &Subcategory,
    drained: usize,
) -> Vec<CountMismatch> {
    let enumerated = sub.rows_enumerated.filter(|_| !hierarchy.truncated);
    let drained = drained as u64;
    [
        (CountBasis::Enumerated, enumerated),
        (CountBasis::Counted, sub.entity_count),
    ]
    .into_iter()
    .filter_map(|(basis, expected)| {
        let expected = expected?;
        (expected != drained).then(|| CountMismatch {
            scope: Scope::subcategory(&hierarchy.manufacturer, &sub.category, &sub.name),
            basis,
            expected,
            drained,
        })
    })
    .collect()
}

/// Drain every subcategory of one category, then stage its landing pages.
async fn process_category(
    ctx: &Context<'_>,
    hierarchy: &Hierarchy,
    category: &Category,
    claimed: &HashSet<String>,
) -> Result<CategoryResult> {
    let manufacturer_slug = &hierarchy.manufacturer_slug;
    let mut result = CategoryResult {
        index_key: format!("{}/{}/index.xml", manufacturer_slug, category.slug),
        output: None,
        landing: Vec::new(),
        failures: Vec::new(),
        mismatches: Vec::new(),
        entities: 0,
        repeated: 0,
        locations: Vec::new(),
    };

    let mut finished = Vec::new();
    for sub in &category.subcategories {
        let label = Scope::subcategory(&hierarchy.manufacturer, &category.name, &sub.name);
        if ctx.cancelled() {
            result.failures.push(skip(label, SkipReason::Cancelled));
            continue;
        }

        let stem = format!(
            "{}/{}/{}/{}-{}",
            manufacturer_slug, category.slug, sub.slug, category.slug, sub.slug
        );
        let scopes = sub.scopes(&hierarchy.manufacturer);
        match drain_scope(ctx, &label, scopes, stem, claimed).await? {
            ScopeOutcome::Drained {
                shards,
                entities,
                repeated,
                locations,
            } => {
                for mismatch in reconcile_subcategory(hierarchy, sub, entities) {
                    log::warn!("Count mismatch {}", mismatch);
                    result.mismatches.push(mismatch);
                }
                result.entities += entities;
                result.repeated += repeated;
                result.locations.extend(locations);
                finished.push(SubcategoryOutput {
                    slug: sub.slug.clone(),
                    shards,
                });
            }
            ScopeOutcome::Failed(failure) => {
                log::error!("Skipping {}", failure);
                result.failures.push(failure);
            }
        }
    }

    if finished.is_empty() {
        return Ok(result);
    }

    let site = &ctx.config.site;
    let mut pages = vec![page_record(
        ctx.scheme.category(manufacturer_slug, &category.slug)?,
        &site.category,
    )];
    for sub in &finished {
        pages.push(page_record(
            ctx.scheme
                .subcategory(manufacturer_slug, &category.slug, &sub.slug)?,
            &site.subcategory,
        ));
    }
    result
        .locations
        .extend(pages.iter().map(|p| p.location.clone()));

    let landing_shards = match ctx.config.output.layout {
        Layout::Tiered => {
            let stem = format!("{}/{}/{}-pages", manufacturer_slug, category.slug, category.slug);
            let mut writer = ShardWriter::new(ctx.publisher, stem, ctx.capacity);
            writer.extend(pages).await?;
            writer.finish().await?
        }
        Layout::Flat => {
            result.landing = pages;
            Vec::new()
        }
    };

    result.output = Some(CategoryOutput {
        manufacturer_slug: manufacturer_slug.clone(),
        slug: category.slug.clone(),
        landing: landing_shards,
        subcategories: finished,
    });
    Ok(result)
}

/// Stream one subcategory into shards, reading each stored spelling of it
/// in turn. A read failure withdraws whatever the subcategory already
/// flushed; a sink failure is returned as an error.
async fn drain_scope(
    ctx: &Context<'_>,
    label: &Scope,
    scopes: Vec<Scope>,
    stem: String,
    claimed: &HashSet<String>,
) -> Result<ScopeOutcome> {
    let mut writer = ShardWriter::new(ctx.publisher, stem, ctx.capacity);
    let mut locations = Vec::new();
    let mut entities = 0;
    let mut repeated = 0;
    let mut pages_read = 0;

    for scope in scopes {
        let mut stream = ctx.reader.stream(scope);
        loop {
            match stream.next_batch().await {
                Ok(Some(batch)) => {
                    for entity in batch {
                        entities += 1;
                        let record = part_record(ctx, &entity)?;
                        if claimed.contains(&record.location) {
                            log::debug!("{}: {} already listed", label, record.location);
                            repeated += 1;
                            continue;
                        }
                        locations.push(record.location.clone());
                        writer.push(record).await?;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    ctx.publisher.withdraw(&writer.abandon());
                    return Ok(ScopeOutcome::Failed(ScopeFailure {
                        scope: stream.scope().clone(),
                        cursor: stream.cursor().map(str::to_string),
                        reason: SkipReason::ReadFailed(e.to_string()),
                    }));
                }
            }
        }
        pages_read += stream.pages_read();
    }

    let shards = writer.finish().await?;
    log::info!(
        "{}: {} parts in {} shard(s), {} page reads",
        label,
        entities,
        shards.len(),
        pages_read
    );
    if repeated > 0 {
        log::warn!(
            "{}: {} part URLs already listed for an earlier manufacturer",
            label,
            repeated
        );
    }
    Ok(ScopeOutcome::Drained {
        shards,
        entities,
        repeated,
        locations,
    })
}

fn part_record(ctx: &Context<'_>, entity: &CatalogEntity) -> Result<UrlRecord> {
    let hints = &ctx.config.site.part;
    Ok(page_record(ctx.scheme.part(&entity.identifier)?, hints)
        .with_last_modified(entity.last_modified))
}

fn page_record(location: String, hints: &PageHints) -> UrlRecord {
    UrlRecord::new(location)
        .with_change_frequency(hints.change_frequency)
        .with_priority(hints.priority)
}

/// Configured static pages, first occurrence of each URL only.
fn static_records(ctx: &Context<'_>) -> Result<Vec<UrlRecord>> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for page in &ctx.config.site.static_pages {
        let location = ctx.scheme.page(&page.path)?;
        if seen.insert(location.clone()) {
            records.push(
                UrlRecord::new(location)
                    .with_change_frequency(page.change_frequency)
                    .with_priority(page.priority),
            );
        }
    }
    Ok(records)
}
