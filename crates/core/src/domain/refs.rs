//! Ref naming rules: what can be checked out and how the current ref is shown.

/// A tag reference as read from the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// Fully qualified name, e.g. `refs/tags/v1.0`
    pub name: String,
    /// Object the ref points at (a tag object for annotated tags)
    pub target: String,
    /// Commit the tag peels to, when different from `target`
    pub peeled: Option<String>,
}

impl TagRef {
    fn points_at(&self, oid: &str) -> bool {
        self.target.eq_ignore_ascii_case(oid)
            || self
                .peeled
                .as_deref()
                .is_some_and(|peeled| peeled.eq_ignore_ascii_case(oid))
    }
}

/// Short display form of a ref: everything after the last `/`
pub fn display_ref_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(index) => &name[index + 1..],
        None => name,
    }
}

/// Whether `name` is a full hex object id rather than a branch name
pub fn is_object_id(name: &str) -> bool {
    name.len() == 40 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Display name of what HEAD points at.
///
/// `head` is either a branch name or, for a detached HEAD, the full object id.
/// A detached HEAD is shown as the first tag pointing at that exact commit;
/// with no such tag the raw id is shown.
pub fn resolve_current_ref(head: &str, tags: &[TagRef]) -> String {
    if is_object_id(head) {
        if let Some(tag) = tags
            .iter()
            .filter(|tag| tag.name.starts_with("refs/tags/"))
            .find(|tag| tag.points_at(head))
        {
            return display_ref_name(&tag.name).to_string();
        }
        return head.to_string();
    }
    display_ref_name(head).to_string()
}

/// Refs offered for checkout: everything but HEAD and local branches, sorted
pub fn checkout_candidates<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut refs: Vec<String> = names
        .into_iter()
        .map(Into::into)
        .filter(|name| name != "HEAD" && !name.ends_with("/HEAD") && !name.starts_with("refs/heads/"))
        .collect();
    refs.sort();
    refs.dedup();
    refs
}
