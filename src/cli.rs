use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};

use crate::burndown::{self, BurndownRecord, BurndownSeries, Granularity};
use crate::model::work_item::WorkItem;
use crate::providers::{ItemFilter, StateFilter, Tracker};
use crate::sync::engine::{BatchCounts, ReconciliationEngine};
use crate::sync::prune::{self, PruneOutcome, CONFIRM_TOKEN};
use crate::timelog::{self, AllocationMap};
use crate::util::table;

/// `issue-sync pull`: export the project's items to a sheet.
pub async fn handle_pull(tracker: &dyn Tracker, output: &Path, state: StateFilter) -> Result<()> {
    let filter = ItemFilter {
        state,
        ..Default::default()
    };
    let items = tracker.list_items(&filter).await?;
    table::export_items(output, &items)?;
    println!("Exported {} {} issues to {}", items.len(), state.as_str(), output.display());
    Ok(())
}

/// `issue-sync update`: reconcile the tracker against a sheet.
pub async fn handle_update(tracker: &dyn Tracker, input: &Path, dry_run: bool) -> Result<()> {
    let rows = table::read_rows_from(input)?;
    let report = ReconciliationEngine::new(tracker)
        .dry_run(dry_run)
        .reconcile(&rows)
        .await;

    for outcome in &report.outcomes {
        println!("{outcome}");
        for warning in &outcome.warnings {
            println!("  warning: {warning}");
        }
    }
    println!();
    println!("{}", summary_line(&report.counts(), dry_run));
    Ok(())
}

pub fn summary_line(counts: &BatchCounts, dry_run: bool) -> String {
    if dry_run {
        format!(
            "Dry run: {} planned, {} unchanged, {} failed (nothing was sent)",
            counts.planned, counts.skipped, counts.failed
        )
    } else {
        format!(
            "{} created, {} updated, {} unchanged, {} failed",
            counts.created, counts.updated, counts.skipped, counts.failed
        )
    }
}

/// `issue-sync close`: close open items the sheet no longer lists.
pub async fn handle_close(tracker: &dyn Tracker, input: &Path, confirm: Option<String>) -> Result<()> {
    let rows = table::read_rows_from(input)?;
    let desired = prune::desired_keys(&rows);
    let current = tracker.list_items(&ItemFilter::default()).await?;
    let selected = prune::select_for_close(&desired, &current);

    if selected.is_empty() {
        println!("Every open issue is listed in {}, nothing to close.", input.display());
        return Ok(());
    }

    println!("{} open issues are not in {}:", selected.len(), input.display());
    for item in &selected {
        println!("  {}", close_line(item));
    }

    let answer = match confirm {
        Some(answer) => Some(answer),
        None => prompt_confirmation()?,
    };

    match prune::close_items(tracker, &selected, answer.as_deref()).await {
        PruneOutcome::Aborted => println!("closure aborted"),
        PruneOutcome::Closed { closed, failed } => {
            println!("Closed {} issues", closed.len());
            for (iid, reason) in &failed {
                println!("  #{iid}: failed: {reason}");
            }
        }
    }
    Ok(())
}

fn close_line(item: &WorkItem) -> String {
    format!("#{} {}", item.iid, item.title)
}

/// Asks for the token on a terminal. Without one there is nobody to ask,
/// which reads as a refusal.
fn prompt_confirmation() -> Result<Option<String>> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let input: String = dialoguer::Input::new()
        .with_prompt(format!("Type '{CONFIRM_TOKEN}' to close them"))
        .allow_empty(true)
        .interact_text()
        .context("Failed to read confirmation")?;
    Ok(Some(input))
}

/// `issue-sync log-time`: spread the day's hours over in-progress items.
pub async fn handle_log_time(
    tracker: &dyn Tracker,
    allocation: &str,
    base_hours: f64,
    status_labels: &[String],
    dry_run: bool,
) -> Result<()> {
    let allocation: AllocationMap = allocation.parse()?;
    // The tracker's label filter needs every label; one status label is enough here.
    let items = tracker.list_items(&ItemFilter::default()).await?;
    let entries = timelog::plan_entries(&allocation, &items, status_labels, base_hours)?;

    if entries.is_empty() {
        println!("No in-progress issues with assignees, nothing to log.");
        return Ok(());
    }

    for entry in &entries {
        println!("#{} {} ({}): {}", entry.iid, entry.title, entry.user, entry.spent);
    }

    if dry_run {
        println!("Dry run: {} time entries planned, nothing was sent", entries.len());
        return Ok(());
    }

    let report = timelog::log_entries(tracker, &entries).await;
    println!("Logged time on {} issues", report.logged);
    for (iid, reason) in &report.failed {
        println!("  #{iid}: failed: {reason}");
    }
    Ok(())
}

/// Every item of the project, open or closed, as burn-down input.
pub async fn fetch_burndown_records(tracker: &dyn Tracker) -> Result<Vec<BurndownRecord>> {
    let filter = ItemFilter {
        state: StateFilter::All,
        ..Default::default()
    };
    let items = tracker.list_items(&filter).await?;
    Ok(items.iter().map(BurndownRecord::from).collect())
}

/// `issue-sync burndown`: print the series and optionally write it out.
pub fn handle_burndown(
    records: &[BurndownRecord],
    granularity: Granularity,
    output: Option<&Path>,
) -> Result<BurndownSeries> {
    let today = chrono::Utc::now().date_naive();
    let series = burndown::aggregate(records, granularity, today)?;

    println!("{:<12} {:>8} {:>10} {:>6}", "period", "created", "completed", "open");
    for point in &series.points {
        println!(
            "{:<12} {:>8} {:>10} {:>6}",
            point.period.to_string(),
            point.created,
            point.completed,
            point.open
        );
    }
    println!("Maximum number of open issues: {}", series.max_open());

    if let Some(path) = output {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        table::write_series(file, &series)?;
        println!("Wrote {} points to {}", series.points.len(), path.display());
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::work_item::{sample_item, ItemState, UserRef};
    use crate::providers::tests::{Call, MockTracker};

    fn sheet(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("issues.csv");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn summary_line_for_live_and_dry_runs() {
        let counts = BatchCounts {
            created: 1,
            updated: 2,
            planned: 0,
            skipped: 3,
            failed: 1,
        };
        assert_eq!(
            summary_line(&counts, false),
            "1 created, 2 updated, 3 unchanged, 1 failed"
        );
        let planned = BatchCounts {
            planned: 4,
            ..Default::default()
        };
        assert!(summary_line(&planned, true).starts_with("Dry run: 4 planned"));
    }

    #[tokio::test]
    async fn pull_writes_open_items() {
        let mut closed = sample_item(2);
        closed.state = ItemState::Closed;
        let tracker = MockTracker::new(vec![sample_item(1), closed]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open_issues.csv");

        handle_pull(&tracker, &path, StateFilter::Opened).await.unwrap();

        let rows = table::read_rows_from(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key(), Some("1"));
    }

    #[tokio::test]
    async fn update_with_missing_column_sends_nothing() {
        let tracker = MockTracker::new(vec![sample_item(1)]);
        let dir = tempfile::tempdir().unwrap();
        let path = sheet(&dir, "iid,epic\n1,Platform\n");

        let err = handle_update(&tracker, &path, false).await.unwrap_err();
        assert!(err.to_string().contains("title"));
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn update_dry_run_reads_but_never_writes() {
        let tracker = MockTracker::new(vec![sample_item(1)]);
        let dir = tempfile::tempdir().unwrap();
        let path = sheet(&dir, "iid,title\n1,Renamed\n,Brand new\n");

        handle_update(&tracker, &path, true).await.unwrap();
        assert!(tracker.mutations().is_empty());
        assert_eq!(tracker.item(1).unwrap().title, "Issue 1");
    }

    #[tokio::test]
    async fn close_with_wrong_token_aborts() {
        let tracker = MockTracker::new(vec![sample_item(1), sample_item(2)]);
        let dir = tempfile::tempdir().unwrap();
        let path = sheet(&dir, "iid,title\n1,Issue 1\n");

        handle_close(&tracker, &path, Some("close".into())).await.unwrap();
        assert!(tracker.mutations().is_empty());
        assert_eq!(tracker.item(2).unwrap().state, ItemState::Opened);
    }

    #[tokio::test]
    async fn close_with_token_closes_unlisted_items() {
        let tracker = MockTracker::new(vec![sample_item(1), sample_item(2)]);
        let dir = tempfile::tempdir().unwrap();
        let path = sheet(&dir, "iid,title\n1,Issue 1\n");

        handle_close(&tracker, &path, Some("CLOSE".into())).await.unwrap();
        assert_eq!(tracker.mutations().len(), 1);
        assert!(matches!(tracker.mutations()[0], Call::Save(2, _)));
        assert_eq!(tracker.item(1).unwrap().state, ItemState::Opened);
        assert_eq!(tracker.item(2).unwrap().state, ItemState::Closed);
    }

    #[tokio::test]
    async fn log_time_missing_allocation_logs_nothing() {
        let mut item = sample_item(1);
        item.labels = vec!["Doing".into()];
        item.assignees = vec![UserRef {
            id: 7,
            username: "bob".into(),
            name: "Bob".into(),
        }];
        let tracker = MockTracker::new(vec![item]);

        let err = handle_log_time(&tracker, "alice: 1", 7.6, &["Doing".to_string()], false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bob"));
        assert!(tracker.mutations().is_empty());
    }

    #[tokio::test]
    async fn log_time_posts_per_item_durations() {
        let mut items = Vec::new();
        for iid in [1, 2] {
            let mut item = sample_item(iid);
            item.labels = vec!["Doing".into()];
            item.assignees = vec![UserRef {
                id: 7,
                username: "alice".into(),
                name: "Alice".into(),
            }];
            items.push(item);
        }
        let tracker = MockTracker::new(items);

        handle_log_time(&tracker, "alice: 0.5", 7.6, &["Doing".to_string()], false)
            .await
            .unwrap();
        assert_eq!(
            tracker.mutations(),
            vec![
                Call::LogTime(1, "1h54m".into()),
                Call::LogTime(2, "1h54m".into())
            ]
        );
    }

    #[tokio::test]
    async fn log_time_counts_items_with_any_status_label() {
        let mut items = Vec::new();
        for (iid, labels) in [(1, vec!["Doing"]), (2, vec!["In Progress"]), (3, vec!["Backlog"])] {
            let mut item = sample_item(iid);
            item.labels = labels.into_iter().map(String::from).collect();
            item.assignees = vec![UserRef {
                id: 7,
                username: "alice".into(),
                name: "Alice".into(),
            }];
            items.push(item);
        }
        let tracker = MockTracker::new(items);
        let status_labels = vec!["Doing".to_string(), "In Progress".to_string()];

        handle_log_time(&tracker, "alice: 1", 7.6, &status_labels, false)
            .await
            .unwrap();
        assert_eq!(
            tracker.mutations(),
            vec![
                Call::LogTime(1, "3h48m".into()),
                Call::LogTime(2, "3h48m".into())
            ]
        );
    }

    #[tokio::test]
    async fn burndown_from_tracker_covers_closed_items() {
        let mut closed = sample_item(2);
        closed.state = ItemState::Closed;
        closed.closed_at = Some("2023-01-03T12:00:00Z".parse().unwrap());
        let tracker = MockTracker::new(vec![sample_item(1), closed]);

        let records = fetch_burndown_records(&tracker).await.unwrap();
        assert_eq!(records.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("burndown.csv");
        let series = handle_burndown(&records, Granularity::Monthly, Some(&out)).unwrap();
        assert_eq!(series.points[0].created, 2);
        assert_eq!(series.points[0].completed, 1);
        assert!(std::fs::read_to_string(&out)
            .unwrap()
            .starts_with("period,created,completed,open\n2023-01,2,1,1\n"));
    }
}
