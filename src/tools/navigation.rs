//! The fixed walk through the MGNREGA portal: home search, results window,
//! asset register, then every muster roll listed on it.

use std::fmt;
use tracing::info;

use crate::core::config::FlowTimings;
use crate::core::error::{MusterError, Result};
use crate::core::types::{MusterRollReference, Provenance, RecordSet, SearchCriteria, WindowHandle};
use crate::scraping::automation::{xpath_literal, Locator, OptionChoice, PageAutomation};
use crate::scraping::retry::RetryingSelector;
use crate::scraping::windows::{WindowManager, WindowSet};
use crate::tools::aggregate::RecordAggregator;
use crate::tools::extract::TableExtractor;

// ── Portal topology ──────────────────────────────────────────────────────────

pub const HOME_SEARCH_URL: &str = "https://mnregaweb4.nic.in/netnrega/homesearch.htm";

/// Iframe hosting the search form on the home page.
pub const SEARCH_FRAME_XPATH: &str = "//iframe[contains(@src,'nregasearch1.aspx')]";

pub const CATEGORY_SELECT_ID: &str = "ddl_search";
pub const REGION_SELECT_ID: &str = "ddl_state";
pub const SUBREGION_SELECT_ID: &str = "ddl_district";
pub const KEYWORD_INPUT_ID: &str = "txt_keyword2";
pub const SUBMIT_BUTTON_ID: &str = "btn_go";

/// Text of the asset register cell whose row lists the muster roll links.
pub const SUMMARY_LABEL: &str = "Distinct Number of Muster Rolls used";

/// Innermost cell holding [`SUMMARY_LABEL`]. Layout cells that merely wrap
/// it would otherwise match first.
pub fn summary_cell_xpath() -> String {
    let label = xpath_literal(SUMMARY_LABEL);
    format!("//td[contains(.,{label}) and not(.//td[contains(.,{label})])]")
}

pub fn summary_row_xpath() -> String {
    format!("{}/parent::tr", summary_cell_xpath())
}

/// Every link in the summary row.
pub fn summary_links() -> Locator {
    Locator::xpath(format!("{}//a", summary_row_xpath()))
}

/// The summary-row link whose text is exactly `label`.
pub fn muster_link(label: &str) -> Locator {
    Locator::xpath(format!(
        "{}//a[normalize-space(.)={}]",
        summary_row_xpath(),
        xpath_literal(label)
    ))
}

// ── State machine ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Init,
    HomeSearchLoaded,
    CriteriaSubmitted,
    ResultsWindowOpen,
    WorkSelected,
    AssetRegisterLoaded,
    MusterLoop,
    Done,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One run of the portal workflow over a borrowed browser session.
///
/// The flow never tears the session down; whoever opened it does, whatever
/// `run` returns.
pub struct NavigationFlow<'d, D: PageAutomation + ?Sized> {
    driver: &'d mut D,
    criteria: SearchCriteria,
    timings: FlowTimings,
    windows: WindowManager,
    selector: RetryingSelector,
    extractor: TableExtractor,
    state: FlowState,
}

impl<'d, D: PageAutomation + ?Sized> NavigationFlow<'d, D> {
    pub fn new(driver: &'d mut D, criteria: SearchCriteria, timings: FlowTimings) -> Self {
        Self {
            windows: WindowManager::new(timings.poll_interval()),
            selector: RetryingSelector::from_timings(&timings),
            extractor: TableExtractor::new(timings.extract_timeout()),
            driver,
            criteria,
            timings,
            state: FlowState::Init,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    fn enter(&mut self, next: FlowState) {
        info!(navigation_state = %next, "{} → {}", self.state, next);
        self.state = next;
    }

    /// Drive the portal from the home page to the last muster roll and
    /// return every record in extraction order. Stops at the first failure.
    pub async fn run(&mut self) -> Result<RecordSet> {
        self.load_home_search().await?;
        let before_submit = self.submit_criteria().await?;
        self.open_results_window(&before_submit).await?;
        self.select_work().await?;
        let asset_window = self.load_asset_register().await?;
        let references = self.collect_muster_references().await?;
        let records = self.process_muster_rolls(&asset_window, &references).await?;
        self.enter(FlowState::Done);
        Ok(records)
    }

    async fn load_home_search(&mut self) -> Result<()> {
        self.driver.navigate(HOME_SEARCH_URL).await?;
        let frame = Locator::xpath(SEARCH_FRAME_XPATH);
        self.driver
            .wait_for(&frame, self.timings.wait_timeout())
            .await?;
        self.driver.enter_frame(&frame).await?;
        self.enter(FlowState::HomeSearchLoaded);
        Ok(())
    }

    /// Fill the search form and press Go. Returns the window set from just
    /// before the click.
    async fn submit_criteria(&mut self) -> Result<WindowSet> {
        let category = OptionChoice::VisibleText(self.criteria.category.label().to_string());
        let region = OptionChoice::VisibleText(self.criteria.region.clone());
        let subregion = OptionChoice::Value(self.criteria.subregion.clone());

        self.selector
            .select(&mut *self.driver, &Locator::id(CATEGORY_SELECT_ID), &category)
            .await?;
        self.selector
            .select(&mut *self.driver, &Locator::id(REGION_SELECT_ID), &region)
            .await?;
        // The district list is rebuilt once a state is chosen.
        tokio::time::sleep(self.timings.settle_delay()).await;
        self.selector
            .select(&mut *self.driver, &Locator::id(SUBREGION_SELECT_ID), &subregion)
            .await?;
        tokio::time::sleep(self.timings.settle_delay()).await;

        let keyword = Locator::id(KEYWORD_INPUT_ID);
        self.driver
            .wait_for(&keyword, self.timings.wait_timeout())
            .await?;
        self.driver
            .enter_text(&keyword, &self.criteria.work_identifier)
            .await?;

        let before = self.windows.snapshot(&mut *self.driver).await?;
        self.driver.click(&Locator::id(SUBMIT_BUTTON_ID)).await?;
        self.enter(FlowState::CriteriaSubmitted);
        Ok(before)
    }

    async fn open_results_window(&mut self, before: &WindowSet) -> Result<()> {
        let results = self
            .windows
            .wait_for_new_window(&mut *self.driver, before, self.timings.window_timeout())
            .await?;
        self.windows.focus(&mut *self.driver, &results).await?;
        self.enter(FlowState::ResultsWindowOpen);
        Ok(())
    }

    async fn select_work(&mut self) -> Result<()> {
        let link = Locator::partial_link_text(self.criteria.work_identifier.clone());
        self.driver
            .wait_for(&link, self.timings.wait_timeout())
            .await?;
        self.driver.script_click(&link).await?;
        self.enter(FlowState::WorkSelected);
        Ok(())
    }

    /// Wait for the asset register and return its window, the home base of
    /// the muster loop.
    async fn load_asset_register(&mut self) -> Result<WindowHandle> {
        self.wait_for_summary().await?;
        let handle = self.driver.current_window().ok_or_else(|| {
            MusterError::Browser("asset register window is not focused".to_string())
        })?;
        self.enter(FlowState::AssetRegisterLoaded);
        Ok(handle)
    }

    async fn wait_for_summary(&mut self) -> Result<()> {
        self.driver
            .wait_for(&Locator::xpath(summary_cell_xpath()), self.timings.wait_timeout())
            .await
    }

    async fn collect_muster_references(&mut self) -> Result<Vec<MusterRollReference>> {
        let labels = self.driver.read_texts(&summary_links()).await?;
        let references: Vec<MusterRollReference> = labels
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .map(MusterRollReference::new)
            .collect();
        info!(
            "🔗 {} muster roll(s) listed for {}",
            references.len(),
            self.criteria.work_identifier
        );
        self.enter(FlowState::MusterLoop);
        Ok(references)
    }

    async fn process_muster_rolls(
        &mut self,
        asset_window: &WindowHandle,
        references: &[MusterRollReference],
    ) -> Result<RecordSet> {
        let mut aggregator = RecordAggregator::new(&self.criteria.work_identifier);
        for (i, reference) in references.iter().enumerate() {
            info!(
                "📄 Muster roll {} ({}/{})",
                reference.label,
                i + 1,
                references.len()
            );
            let provenance = Provenance::new(
                self.criteria.work_identifier.clone(),
                reference.label.clone(),
            );
            let records = self.process_one(asset_window, reference, &provenance).await?;
            aggregator.absorb(reference, records);
        }
        Ok(aggregator.finish())
    }

    async fn process_one(
        &mut self,
        asset_window: &WindowHandle,
        reference: &MusterRollReference,
        provenance: &Provenance,
    ) -> Result<RecordSet> {
        // Earlier iterations may have replaced this window's document.
        self.windows.focus(&mut *self.driver, asset_window).await?;
        self.wait_for_summary().await?;

        let link = muster_link(&reference.label);
        self.driver
            .wait_for(&link, self.timings.wait_timeout())
            .await?;
        let before = self.windows.snapshot(&mut *self.driver).await?;
        self.driver.script_click(&link).await?;
        tokio::time::sleep(self.timings.popup_grace()).await;

        let after = self.windows.snapshot(&mut *self.driver).await?;
        match WindowManager::opened_since(&before, &after) {
            Some(popup) => {
                self.windows.focus(&mut *self.driver, &popup).await?;
                let records = self.extractor.extract(&mut *self.driver, provenance).await?;
                self.windows
                    .close_and_return(&mut *self.driver, &popup, asset_window)
                    .await?;
                Ok(records)
            }
            None => {
                let records = self.extractor.extract(&mut *self.driver, provenance).await?;
                self.driver.go_back().await?;
                self.wait_for_summary().await?;
                Ok(records)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_muster_link_matches_whole_label() {
        let Locator::XPath(x) = muster_link("3") else {
            panic!("expected an xpath locator");
        };
        assert!(x.ends_with("/parent::tr//a[normalize-space(.)='3']"));
    }

    #[test]
    fn test_summary_cell_excludes_wrapping_cells() {
        assert_eq!(
            summary_cell_xpath(),
            "//td[contains(.,'Distinct Number of Muster Rolls used') and \
             not(.//td[contains(.,'Distinct Number of Muster Rolls used')])]"
        );
    }

    #[test]
    fn test_state_display_is_variant_name() {
        assert_eq!(FlowState::AssetRegisterLoaded.to_string(), "AssetRegisterLoaded");
    }
}
