//! Artisan command whitelist.
//!
//! This list is the only gate between the custom command field in the UI and
//! code execution inside a site, so it is matched by exact name or `name:`
//! prefix and nothing looser.

/// Base commands a user may run. Entries without a colon also admit their
/// `entry:subcommand` namespace (`cache` admits `cache:clear`).
pub const ALLOWED_COMMANDS: &[&str] = &[
    // Migrations
    "migrate",
    "migrate:fresh",
    "migrate:install",
    "migrate:refresh",
    "migrate:reset",
    "migrate:rollback",
    "migrate:status",
    "db:seed",
    "db:show",
    "db:table",
    "db:wipe",
    "schema:dump",
    // Caches
    "cache",
    "config",
    "route",
    "view",
    "event",
    "optimize",
    "optimize:clear",
    "clear-compiled",
    // Queue
    "queue:failed",
    "queue:retry",
    "queue:forget",
    "queue:flush",
    "queue:monitor",
    "queue:prune-failed",
    "queue:restart",
    "queue:clear",
    // Setup
    "key:generate",
    "storage:link",
    "vendor:publish",
    "package:discover",
    "schedule:list",
    // Generators
    "make",
    "make:controller",
    "make:model",
    "make:migration",
    "make:seeder",
    "make:factory",
    "make:middleware",
    "make:request",
    "make:resource",
    "make:job",
    "make:mail",
    "make:command",
    "make:test",
    // Information
    "about",
    "list",
    "help",
    "inspire",
    "model:show",
    // Starter kit installers
    "breeze:install",
    "jetstream:install",
];

/// Returns true when the first element of `command_parts` is a whitelisted
/// base command, either exactly or as `entry:` followed by a subcommand.
pub fn is_allowed(command_parts: &[String]) -> bool {
    let Some(base) = command_parts.first() else {
        return false;
    };
    is_allowed_base(base)
}

/// Whitelist check for a single base command.
pub fn is_allowed_base(base: &str) -> bool {
    let base = base.trim();
    if base.is_empty() {
        return false;
    }
    ALLOWED_COMMANDS.iter().any(|entry| {
        base == *entry
            || base
                .strip_prefix(entry)
                .and_then(|rest| rest.strip_prefix(':'))
                .is_some_and(|sub| !sub.is_empty())
    })
}
