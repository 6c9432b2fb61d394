// Headless CLI: fetch a page, scan it for gallery images, optionally follow
// pagination, and print the records as JSON lines.

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use url::Url;

use gallery_scout::{
    CancelToken, CollectedImages, ConfidenceScorer, FetchRequest, Fetcher, HttpFetcher,
    ImageCollector, PaginationDetector, PaginationEngine, PaginationState, PatternRecognizer,
    PatternStore, ScanConfigBuilder, StaticDomAdapter, StepOutcome, TokioClock, UrlCanonicalizer,
    dom::DomAdapter, ports::FetchNavigator,
};

struct CliArgs {
    url: Url,
    max_pages: u32,
}

fn parse_args() -> Result<CliArgs> {
    let mut url = None;
    let mut max_pages = 1u32;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--paginate" => {
                max_pages = args
                    .next()
                    .context("--paginate requires a page count")?
                    .parse()
                    .context("--paginate takes a number")?;
            }
            other if url.is_none() => {
                url = Some(Url::parse(other).with_context(|| format!("invalid URL {other:?}"))?);
            }
            other => return Err(anyhow!("unexpected argument {other:?}")),
        }
    }

    Ok(CliArgs {
        url: url.context("usage: gallery-scout <url> [--paginate N]")?,
        max_pages: max_pages.max(1),
    })
}

fn print_records(collected: &CollectedImages) -> Result<()> {
    for record in &collected.records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args()?;
    let config = ScanConfigBuilder::new()
        .max_pages(args.max_pages)
        .build()?;

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);
    let urls = UrlCanonicalizer::new(config.strip_query)
        .with_image_extensions(config.image_extensions.clone());
    let scorer = ConfidenceScorer::new(config.scoring.clone());

    let response = fetcher
        .fetch(FetchRequest::get(args.url.clone()), CancelToken::new())
        .await
        .with_context(|| format!("failed to fetch {}", args.url))?;
    if response.status >= 400 {
        return Err(anyhow!("HTTP {} from {}", response.status, args.url));
    }

    let mut dom: Arc<dyn DomAdapter> = Arc::new(StaticDomAdapter::parse(&response.body_text()));
    let mut current_url = response.final_url.clone();

    let scan = |dom: &Arc<dyn DomAdapter>, page_url: &Url| -> Result<CollectedImages> {
        let collector = ImageCollector::new(&**dom, &urls, &config.collector, page_url);
        let collected = collector.collect(None)?;
        let recognizer =
            PatternRecognizer::new(&**dom, &scorer, &config.patterns, page_url);
        let patterns = recognizer.detect()?;
        log::info!(
            "{}: {} image(s), {} gallery pattern(s)",
            page_url,
            collected.records.len(),
            patterns.len()
        );
        Ok(collected)
    };

    print_records(&scan(&dom, &current_url)?)?;

    if args.max_pages > 1 {
        let detector = PaginationDetector::new(
            urls.clone(),
            config.pagination.clone(),
            Arc::new(PatternStore::new(config.pagination.learned_ttl_days)),
        );
        let navigator = Arc::new(FetchNavigator::new(Arc::clone(&fetcher)));
        let engine = PaginationEngine::new(
            current_url.host_str().unwrap_or("session").to_string(),
            detector,
            navigator,
            Arc::new(TokioClock),
            config.pagination.clone(),
        );

        let mut state = PaginationState::new(config.pagination.history_cap);
        engine.prime(&mut state, &dom, &current_url);
        while state.current_page() < args.max_pages {
            match engine.step(&mut state, &mut dom, &mut current_url).await {
                StepOutcome::Advanced => print_records(&scan(&dom, &current_url)?)?,
                StepOutcome::StrategyFailed => {}
                StepOutcome::Terminal(reason) => {
                    log::info!("pagination ended: {reason:?}");
                    break;
                }
            }
        }
    }

    Ok(())
}
