/// Scope membership as answered by the run configuration
pub trait ScopeConfig: Send + Sync {
    /// Returns true when `name` falls under one of the permitted root domains
    fn is_domain_in_scope(&self, name: &str) -> bool;
}

/// Decides whether a request for `name` under `domain` should be processed at all.
///
/// Empty input and a missing configuration are silent rejections, never errors.
pub fn is_in_scope(scope: Option<&dyn ScopeConfig>, name: &str, domain: &str) -> bool {
    if name.is_empty() || domain.is_empty() {
        return false;
    }

    match scope {
        Some(cfg) => cfg.is_domain_in_scope(name),
        None => false,
    }
}

/// Root domains permitted for a run plus names that must never be queried
#[derive(Debug, Clone, Default)]
pub struct DomainScope {
    roots: Vec<String>,
    blacklist: Vec<String>,
}

impl DomainScope {
    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        DomainScope {
            roots: clean_list(roots),
            blacklist: Vec::new(),
        }
    }

    pub fn with_blacklist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blacklist = clean_list(names);
        self
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// The root domain `name` belongs to, longest match first
    pub fn root_of(&self, name: &str) -> Option<&str> {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        self.roots
            .iter()
            .filter(|root| covers(root, &name))
            .max_by_key(|root| root.len())
            .map(String::as_str)
    }

    fn is_blacklisted(&self, name: &str) -> bool {
        self.blacklist.iter().any(|entry| covers(entry, name))
    }
}

impl ScopeConfig for DomainScope {
    fn is_domain_in_scope(&self, name: &str) -> bool {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        if name.is_empty() || self.is_blacklisted(&name) {
            return false;
        }
        self.roots.iter().any(|root| covers(root, &name))
    }
}

fn clean_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.as_ref().trim().trim_end_matches('.').to_ascii_lowercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// `name` equals `root` or is a subdomain of it; both already lowercase
fn covers(root: &str, name: &str) -> bool {
    name == root
        || (name.len() > root.len()
            && name.ends_with(root)
            && name.as_bytes()[name.len() - root.len() - 1] == b'.')
}
