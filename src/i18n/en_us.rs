// ============================================================================
// SProx - English Translation Table
// ============================================================================
//
// 文件: src/i18n/en_us.rs
// 职责: English user-facing messages
// 边界:
//   - ✅ English translation strings
//   - ❌ Should not contain translation logic
//   - ❌ Should not contain other language translations
//
// ============================================================================

/// English translation table
pub const TRANSLATIONS: &[(&str, &str)] = &[
    // Run command
    ("run.no_function", "Please specify a function to execute."),
    (
        "run.no_match",
        "No devices matched your target. Please review your target expression, target type, or the roster file.",
    ),
    ("run.preview_header", "Targets matched by {} ({}):"),
    ("run.start", "Executing {} on {} target(s), batch size {}"),
    (
        "run.no_existing_proxy",
        "No existing proxy workers are available, all targets run as ephemeral workers",
    ),
    ("run.returner_unavailable", "Returner unavailable: {}"),
    ("run.inventory_failed", "Failed to load the roster: {}"),
    // Summary
    ("summary.title", "Summary"),
    ("summary.jid", "Job ID: {}"),
    ("summary.targeted", "# of devices targeted: {}"),
    ("summary.returned", "# of devices returned: {}"),
    ("summary.timed_out", "# of devices that did not return: {}"),
    ("summary.failed", "# of devices with errors: {}"),
    ("summary.unreachable", "# of devices unreachable: {}"),
    ("summary.aborted", "# of devices aborted: {}"),
    ("summary.duration", "Execution time: {}"),
    ("summary.exit_code", "Exit code: {}"),
    // Output
    ("output.serialize_failed", "Could not render the result of {}: {}"),
    ("progress.message", "devices"),
    // Init command
    (
        "init.exists",
        "Config file already exists: {} (use --force to overwrite)",
    ),
    ("init.created", "Config file created: {}"),
    (
        "init.next_step",
        "Point inventory.roster_file at your roster, then run: sprox '*' test.ping",
    ),
];
