//! Dry-run listing of what `start_all` would launch.

use std::fmt::Write;

use super::launcher::build_args;
use super::registry::Registry;
use crate::config::Config;
use crate::error::ResolveError;

/// Renders groups in dependency order with the exact command lines, ready checks and
/// flags, followed by the processes that would be passed over and why.
pub(super) fn render(reg: &Registry, cfg: &Config) -> Result<String, ResolveError> {
    let plan = reg.start_plan()?;
    let groups = reg.groups();
    let node = cfg.node_name.as_str();

    let mut out = String::new();
    let mut skipped = Vec::new();
    let mut count = 0usize;

    let _ = writeln!(out, "=== Run list for node '{node}' ===\n");
    for (group, members) in plan {
        let Some(g) = groups.iter().find(|g| g.name == group) else {
            continue;
        };
        let _ = write!(out, "Group {}: {}", g.order, g.name);
        if !g.depends.is_empty() {
            let deps: Vec<&str> = g.depends.iter().map(String::as_str).collect();
            let _ = write!(out, " (depends: {})", deps.join(", "));
        }
        out.push('\n');

        for name in members {
            let Some(info) = reg.get(&name) else {
                continue;
            };
            if let Some(reason) = info.exclusion(node) {
                skipped.push(format!("{name} ({reason})"));
                continue;
            }
            if info.manual {
                skipped.push(format!("{name} (manual, start by name)"));
                continue;
            }

            count += 1;
            let _ = write!(out, "  [{count}] {name}");
            if info.oneshot {
                out.push_str(" (oneshot)");
            }
            out.push('\n');

            let _ = write!(out, "      Command: {}", info.command);
            for arg in build_args(info, cfg) {
                let _ = write!(out, " {arg}");
            }
            out.push('\n');
            if !info.ready_check.is_empty() {
                let _ = writeln!(
                    out,
                    "      Ready: {} (timeout: {}ms)",
                    info.ready_check,
                    info.ready_check.timeout.as_millis()
                );
            }
            if let Some(live) = info.health_check.as_ref().filter(|c| !c.is_empty()) {
                let _ = writeln!(
                    out,
                    "      Liveness: {} (threshold: {})",
                    live, info.health_fail_threshold
                );
            }
            if !info.critical {
                out.push_str("      critical: no\n");
            }
        }
        out.push('\n');
    }

    if !skipped.is_empty() {
        out.push_str("Skipped:\n");
        for s in &skipped {
            let _ = writeln!(out, "  - {s}");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "Total: {count} processes to start");
    Ok(out)
}
