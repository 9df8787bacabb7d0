use crate::models::session::SessionKind;

/// Maps the upstream's session names onto the session kinds we probe.
/// Sprint formats are not used for roster extraction.
pub fn map_session_name(external: &str) -> Option<SessionKind> {
    match external {
        "Practice 1" => Some(SessionKind::FirstPractice),
        "Practice 2" => Some(SessionKind::SecondPractice),
        "Practice 3" => Some(SessionKind::ThirdPractice),
        "Qualifying" => Some(SessionKind::Qualifying),
        "Race" => Some(SessionKind::Race),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_session_names() {
        assert_eq!(map_session_name("Race"), Some(SessionKind::Race));
        assert_eq!(map_session_name("Practice 3"), Some(SessionKind::ThirdPractice));
        assert_eq!(map_session_name("Sprint"), None);
        assert_eq!(map_session_name("Sprint Qualifying"), None);
    }
}
