//! Entry point: one work code in, one spreadsheet path out.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::core::config::{FlowTimings, ScraperConfig};
use crate::core::error::Result;
use crate::core::types::{RecordSet, SearchCriteria};
use crate::scraping::automation::PageAutomation;
use crate::scraping::chromium::ChromiumSession;
use crate::tools::export;
use crate::tools::navigation::NavigationFlow;

/// Launch a browser, pull every muster roll of `work_code` and write them to
/// `<output_dir>/mnrega_<code>.xlsx`. Returns the written path.
///
/// The browser is shut down on every exit path. Nothing is written unless
/// the whole run succeeds.
pub async fn run_mnrega_scraper(
    work_code: &str,
    output_dir: &Path,
    config: &ScraperConfig,
) -> Result<PathBuf> {
    // Reject bad input before paying for a browser launch.
    SearchCriteria::for_work(work_code)?;
    let mut session =
        ChromiumSession::open(&config.browser, config.timings.poll_interval()).await?;
    run_with_driver(&mut session, work_code, output_dir, &config.timings).await
}

/// Same as [`run_mnrega_scraper`] over an already open session, which is
/// quit before returning.
pub async fn run_with_driver<D>(
    driver: &mut D,
    work_code: &str,
    output_dir: &Path,
    timings: &FlowTimings,
) -> Result<PathBuf>
where
    D: PageAutomation + ?Sized,
{
    let start = Instant::now();
    let outcome = collect(&mut *driver, work_code, timings).await;

    if let Err(e) = driver.quit().await {
        warn!("browser teardown failed: {}", e);
    }

    let (criteria, records) = match outcome {
        Ok(v) => v,
        Err(e) => {
            error!("❌ Run for {} failed after {}ms: {}", work_code, start.elapsed().as_millis(), e);
            return Err(e);
        }
    };

    let path = export::artifact_path(output_dir, &criteria.work_identifier);
    export::write_records(&path, &records)?;
    info!(
        "✅ {} done in {}ms → {}",
        criteria.work_identifier,
        start.elapsed().as_millis(),
        path.display()
    );
    Ok(path)
}

async fn collect<D>(
    driver: &mut D,
    work_code: &str,
    timings: &FlowTimings,
) -> Result<(SearchCriteria, RecordSet)>
where
    D: PageAutomation + ?Sized,
{
    let criteria = SearchCriteria::for_work(work_code)?;
    info!("🔎 Collecting muster rolls for {}", criteria.work_identifier);
    let mut flow = NavigationFlow::new(driver, criteria.clone(), timings.clone());
    let records = flow.run().await?;
    Ok((criteria, records))
}
