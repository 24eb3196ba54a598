/// Convert a git remote URL into the repository's web URL.
///
/// Supports SSH (`git@host:group/project.git`) and HTTPS (`https://host/group/project[.git]`).
/// Any other form yields None, which suppresses the source-control link.
pub fn remote_to_web_url(remote: &str) -> Option<String> {
    let remote = remote.trim();

    // SSH: git@gitlab.com:GROUP/SUBGROUP/project.git
    if let Some(rest) = remote.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        let path = path.strip_suffix(".git")?;
        if host.is_empty() || path.is_empty() {
            return None;
        }
        return Some(format!("https://{host}/{path}"));
    }

    // HTTPS: already a web URL, just drop the .git suffix
    if remote.starts_with("https://") {
        return Some(remote.strip_suffix(".git").unwrap_or(remote).to_string());
    }

    None
}
