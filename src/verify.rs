//! Metadata verification: reduce the fetched snapshot into per-tablet and
//! per-table health verdicts.
//!
//! Per tablet, observations accumulate into three buckets with fixed
//! precedence in the printed report: warnings, then errors, then infos.
//! Infos are only printed for tablets that have problems; a tablet with any
//! warning or error is "bad", and a table with any bad tablet is bad.

use tracing::debug;

use crate::check::CheckError;
use crate::cluster::{Cluster, Table, Tablet, TabletState};
use crate::filter::matches_any_pattern;
use crate::output::OutputSink;

/// Smallest replica count that constitutes a majority of `num_replicas`
/// voters.
pub fn majority_size(num_replicas: usize) -> usize {
    num_replicas / 2 + 1
}

/// Checks every table matching `table_filters` and prints a verdict for
/// each. Returns `Corruption` with the bad-table count if any table has a
/// bad tablet.
pub fn check_tables_consistency(
    cluster: &Cluster,
    table_filters: &[String],
    tablet_id_filters: &[String],
    check_replica_count: bool,
    output: &OutputSink,
) -> Result<(), CheckError> {
    let mut tables_checked = 0usize;
    let mut bad_tables = 0usize;
    for table in &cluster.tables {
        if !matches_any_pattern(table_filters, &table.name) {
            debug!(table = %table.name, "skipping table");
            continue;
        }
        tables_checked += 1;
        if !verify_table(cluster, table, tablet_id_filters, check_replica_count, output) {
            bad_tables += 1;
        }
    }

    if tables_checked == 0 {
        output.info("The cluster doesn't have any matching tables");
        return Ok(());
    }

    if bad_tables == 0 {
        output.info(&format!(
            "The metadata for {} table(s) is HEALTHY",
            tables_checked
        ));
        Ok(())
    } else {
        output.warn(&format!(
            "{} out of {} table(s) are not in a healthy state",
            bad_tables, tables_checked
        ));
        Err(CheckError::Corruption(format!(
            "{} table(s) are bad",
            bad_tables
        )))
    }
}

fn verify_table(
    cluster: &Cluster,
    table: &Table,
    tablet_id_filters: &[String],
    check_replica_count: bool,
    output: &OutputSink,
) -> bool {
    let tablets: Vec<&Tablet> = table
        .tablets
        .iter()
        .filter(|t| matches_any_pattern(tablet_id_filters, &t.id))
        .collect();
    if tablets.is_empty() {
        output.info(&format!("Table {} has 0 matching tablets", table.name));
        return true;
    }

    debug!(
        table = %table.name,
        tablets = tablets.len(),
        num_replicas = table.num_replicas,
        "verifying table"
    );

    let mut bad_tablets = 0usize;
    for tablet in &tablets {
        if !verify_tablet(cluster, table, tablet, check_replica_count, output) {
            bad_tablets += 1;
        }
    }
    if bad_tablets == 0 {
        output.info(&format!(
            "Table {} is HEALTHY ({} tablets checked)",
            table.name,
            tablets.len()
        ));
        true
    } else {
        output.warn(&format!(
            "Table {} has {} bad tablets",
            table.name, bad_tablets
        ));
        false
    }
}

/// Reduces one tablet's replicas into a verdict, printing the diagnostic
/// block when anything is off. Returns true iff the tablet is clean.
fn verify_tablet(
    cluster: &Cluster,
    table: &Table,
    tablet: &Tablet,
    check_replica_count: bool,
    output: &OutputSink,
) -> bool {
    let tablet_str = format!("Tablet {} of table '{}'", tablet.id, table.name);
    let num_replicas = table.num_replicas as usize;

    let mut warnings: Vec<String> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let mut infos: Vec<String> = Vec::new();

    if check_replica_count && tablet.replicas.len() != num_replicas {
        warnings.push(format!(
            "{} has {} instead of {} replicas",
            tablet_str,
            tablet.replicas.len(),
            num_replicas
        ));
    }

    let mut leaders_count = 0usize;
    let mut followers_count = 0usize;
    let mut alive_count = 0usize;
    let mut running_count = 0usize;
    for replica in &tablet.replicas {
        // Agreement check between the master's placement and the hosting
        // server's own view of the tablet.
        let ts = cluster.tablet_servers.get(&replica.ts_uuid);
        match ts {
            Some(ts) if ts.is_healthy() => {
                alive_count += 1;
                let state = ts.replica_state(&tablet.id);
                match state {
                    TabletState::Running => {
                        debug!(ts = %ts, tablet = %tablet.id, "replica is RUNNING");
                        running_count += 1;
                        infos.push(format!("OK state on TS {}: {}", ts, state));
                    }
                    TabletState::Unknown => {
                        warnings.push(format!(
                            "Missing a tablet replica on tablet server {}",
                            ts
                        ));
                    }
                    _ => {
                        let report = ts
                            .tablet_report(&tablet.id)
                            .expect("non-UNKNOWN state without a report");
                        warnings.push(format!(
                            "Bad state on TS {}: {}\n  Last status: {}\n  Data state:  {}",
                            ts, state, report.last_status, report.data_state
                        ));
                    }
                }
            }
            _ => {
                // Either the master referenced a uuid missing from the
                // directory, or the server could not be fetched.
                let ts_str = ts
                    .map(|ts| ts.to_string())
                    .unwrap_or_else(|| replica.ts_uuid.clone());
                warnings.push(format!(
                    "Should have a replica on TS {}, but TS is unavailable",
                    ts_str
                ));
            }
        }
        if replica.role.is_leader() {
            leaders_count += 1;
        } else if replica.role.is_follower() {
            followers_count += 1;
        }
    }

    if leaders_count == 0 {
        errors.push("No leader detected".to_string());
    }
    debug!(
        tablet = %tablet.id,
        leaders = leaders_count,
        followers = followers_count,
        "counted replica roles"
    );

    let majority = majority_size(num_replicas);
    if alive_count < majority {
        errors.push(format!(
            "{} does not have a majority of replicas on live tablet servers",
            tablet_str
        ));
    } else if running_count < majority {
        errors.push(format!(
            "{} does not have a majority of replicas in RUNNING state",
            tablet_str
        ));
    }

    let has_issues = !warnings.is_empty() || !errors.is_empty();
    if has_issues {
        output.warn(&format!("Detected problems with {}", tablet_str));
        output.err_line(&"-".repeat(60));
        for warning in &warnings {
            output.warn(warning);
        }
        for error in &errors {
            output.error(error);
        }
        for info in &infos {
            output.info(info);
        }
        output.err_line("");
    }

    !has_issues
}
