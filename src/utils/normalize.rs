use std::collections::HashMap;

use crate::models::reference::TeamCatalog;

/// Maps a team name as spelled by the upstream for a given season onto the
/// canonical display name. Names that match nothing come back unchanged.
pub fn normalize_team_name(catalog: &TeamCatalog, team_name: &str) -> String {
    if team_name.is_empty() {
        return String::new();
    }

    if let Some(canonical) = catalog.alias(team_name) {
        return canonical.to_string();
    }

    let lowered = team_name.to_lowercase();
    if let Some(canonical) = catalog.alias_ignore_case(&lowered) {
        return canonical.to_string();
    }

    catalog
        .roots()
        .find(|(token, _)| lowered.contains(token))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| team_name.to_string())
}

/// Lowercase-underscore key used as the constructors' natural key.
pub fn constructor_id(catalog: &TeamCatalog, team_name: &str) -> String {
    if team_name.is_empty() {
        return String::new();
    }

    let id = normalize_team_name(catalog, team_name)
        .to_lowercase()
        .replace([' ', '-'], "_");
    match id.strip_suffix("_f1_team") {
        Some(stripped) => stripped.to_string(),
        None => id,
    }
}

pub fn team_nationality(catalog: &TeamCatalog, team_name: &str) -> String {
    let canonical = normalize_team_name(catalog, team_name);
    catalog
        .nationality(&canonical)
        .unwrap_or("Unknown")
        .to_string()
}

pub fn normalize_driver_name(name: &str) -> String {
    name.to_lowercase().replace([' ', '-', '_'], "")
}

pub fn driver_championships(table: &HashMap<String, i32>, surname: &str) -> i32 {
    table
        .get(&normalize_driver_name(surname))
        .copied()
        .unwrap_or(0)
}

/// Per-driver constructor titles are not tracked yet.
pub fn constructor_championships(_surname: &str, _team_name: &str) -> i32 {
    0
}

pub fn is_driver_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn is_numeric_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_digit())
}
