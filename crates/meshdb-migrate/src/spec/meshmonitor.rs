//! Built-in spec for MeshMonitor's SQLite database.
//!
//! `TABLE_ORDER` is maintained by hand: parents first, then tables holding
//! foreign keys into them. Tables the source has but this list does not are
//! appended after it by the resolver.

use std::collections::{BTreeMap, BTreeSet};

use super::{DefaultValue, MigrationSpec};
use crate::transform::TransformRule;

const TABLE_ORDER: &[&str] = &[
    "nodes",
    "channels",
    "users",
    "settings",
    "messages",
    "telemetry",
    "traceroutes",
    "route_segments",
    "neighbor_info",
    "permissions",
    "user_notification_preferences",
    "push_subscriptions",
    "read_messages",
    "api_tokens",
    "audit_log",
    "packet_log",
    "backup_history",
    "custom_themes",
    "user_map_preferences",
];

/// Session store and bookkeeping tables that are rebuilt by the application.
const SKIP_TABLES: &[&str] = &["sessions", "migrations", "schema_migrations", "sqlite_sequence"];

const COLUMN_MAPPINGS: &[(&str, &str, &str)] = &[
    ("user_notification_preferences", "enabled_channels", "notify_on_channel_messages"),
    ("user_notification_preferences", "monitored_nodes", "notify_on_node_activity"),
    ("users", "provider", "auth_provider"),
];

const SKIP_COLUMNS: &[(&str, &str)] = &[
    ("nodes", "lastTracerouteRequest"),
    ("users", "password_reset_token"),
    ("push_subscriptions", "legacy_keys"),
];

const DEFAULT_MILLIS: &[(&str, &str)] = &[
    ("nodes", "createdAt"),
    ("nodes", "updatedAt"),
    ("channels", "createdAt"),
    ("channels", "updatedAt"),
    ("settings", "createdAt"),
    ("settings", "updatedAt"),
    ("users", "created_at"),
    ("user_notification_preferences", "created_at"),
    ("user_notification_preferences", "updated_at"),
    ("push_subscriptions", "created_at"),
];

const BOOLEAN_FLAGS: &[(&str, &str)] = &[
    ("nodes", "isFavorite"),
    ("nodes", "isIgnored"),
    ("nodes", "viaMqtt"),
    ("channels", "uplinkEnabled"),
    ("channels", "downlinkEnabled"),
    ("messages", "viaMqtt"),
    ("messages", "wantAck"),
    ("users", "is_admin"),
    ("users", "is_active"),
    ("users", "password_locked"),
    ("permissions", "can_read"),
    ("permissions", "can_write"),
    ("user_notification_preferences", "enable_web_push"),
    ("user_notification_preferences", "enable_apprise"),
    ("api_tokens", "is_active"),
];

const JSON_LIST_FLAGS: &[(&str, &str)] = &[
    ("user_notification_preferences", "notify_on_channel_messages"),
    ("user_notification_preferences", "notify_on_node_activity"),
];

const IDENTITY_COLUMNS: &[(&str, &str)] = &[
    ("users", "id"),
    ("telemetry", "id"),
    ("traceroutes", "id"),
    ("route_segments", "id"),
    ("neighbor_info", "id"),
    ("permissions", "id"),
    ("user_notification_preferences", "id"),
    ("push_subscriptions", "id"),
    ("api_tokens", "id"),
    ("audit_log", "id"),
    ("packet_log", "id"),
    ("backup_history", "id"),
];

pub(super) fn spec() -> MigrationSpec {
    let mut spec = MigrationSpec {
        table_order: TABLE_ORDER.iter().map(|t| t.to_string()).collect(),
        skip_tables: SKIP_TABLES.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    };

    for (table, from, to) in COLUMN_MAPPINGS {
        spec.column_mappings
            .entry(table.to_string())
            .or_default()
            .insert(from.to_string(), to.to_string());
    }

    for (table, column) in SKIP_COLUMNS {
        spec.skip_columns
            .entry(table.to_string())
            .or_insert_with(BTreeSet::new)
            .insert(column.to_string());
    }

    for (table, column) in DEFAULT_MILLIS {
        spec.default_values
            .entry(table.to_string())
            .or_insert_with(BTreeMap::new)
            .insert(column.to_string(), DefaultValue::NowMillis);
    }

    let auth_providers = BTreeMap::from([
        ("LOCAL".to_string(), "local".to_string()),
        ("local".to_string(), "local".to_string()),
        ("OIDC".to_string(), "oidc".to_string()),
        ("oidc".to_string(), "oidc".to_string()),
    ]);
    add_rule(&mut spec, "users", "auth_provider", TransformRule::Enum(auth_providers));

    for (table, column) in BOOLEAN_FLAGS {
        add_rule(&mut spec, table, column, TransformRule::BooleanFlag);
    }
    for (table, column) in JSON_LIST_FLAGS {
        add_rule(&mut spec, table, column, TransformRule::JsonListNonEmpty);
    }

    spec.identity_columns = IDENTITY_COLUMNS
        .iter()
        .map(|(t, c)| (t.to_string(), c.to_string()))
        .collect();

    spec
}

fn add_rule(spec: &mut MigrationSpec, table: &str, column: &str, rule: TransformRule) {
    spec.transforms
        .entry(table.to_string())
        .or_default()
        .insert(column.to_string(), rule);
}
