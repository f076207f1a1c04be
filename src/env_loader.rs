use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(tier_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(tier_home) = tier_home {
        return Some(tier_home.join(".env"));
    }
    Some(home_dir?.join(".cache-tier/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("TIER_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_tier_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/boot/config/plugins/cache-tier")),
            Some(PathBuf::from("/root")),
        );

        let want = Some(PathBuf::from("/boot/config/plugins/cache-tier/.env"));
        assert_eq!(got, want);
    }

    #[test]
    fn fallback_uses_home_when_tier_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/root")));
        let want = Some(PathBuf::from("/root/.cache-tier/.env"));
        assert_eq!(got, want);
    }

    #[test]
    fn fallback_is_none_without_any_home() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
