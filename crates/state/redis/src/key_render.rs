use remedy_state::StateKey;

/// Render a [`StateKey`] into a Redis key string with the given prefix.
///
/// The format is `prefix:namespace:tenant:kind:id`.
pub fn render_key(prefix: &str, key: &StateKey) -> String {
    format!("{prefix}:{}", key.canonical())
}

/// Strip the deployment prefix from a rendered Redis key, yielding the
/// canonical `namespace:tenant:kind:id` form.
pub fn strip_prefix<'a>(prefix: &str, rendered: &'a str) -> &'a str {
    rendered
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(rendered)
}

#[cfg(test)]
mod tests {
    use remedy_state::KeyKind;

    use super::*;

    #[test]
    fn renders_standard_key() {
        let key = StateKey::new("remediation", "tenant-1", KeyKind::Job, "abc-123");
        let rendered = render_key("remedy", &key);
        assert_eq!(rendered, "remedy:remediation:tenant-1:job:abc-123");
    }

    #[test]
    fn renders_active_slot_key() {
        let key = StateKey::new("ns", "t", KeyKind::ActiveJob, "bucket:TYPE");
        let rendered = render_key("pfx", &key);
        assert_eq!(rendered, "pfx:ns:t:active_job:bucket:TYPE");
    }

    #[test]
    fn strip_prefix_inverts_render() {
        let key = StateKey::new("ns", "t", KeyKind::ActiveJob, "bucket:TYPE");
        let rendered = render_key("p", &key);
        assert_eq!(strip_prefix("p", &rendered), key.canonical());
    }
}
