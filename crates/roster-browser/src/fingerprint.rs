use rand::Rng;
use roster_core::BrowserConfig;

/// Desktop browser identities handed out to pages.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Per-page identity: user agent and jittered viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl FingerprintConfig {
    /// Generate a randomized fingerprint around the configured base viewport.
    pub fn randomized(browser: &BrowserConfig) -> Self {
        Self::randomized_with(&mut rand::thread_rng(), browser)
    }

    /// Same as [`randomized`](Self::randomized) with a caller-supplied RNG.
    pub fn randomized_with<R: Rng>(rng: &mut R, browser: &BrowserConfig) -> Self {
        let ua_idx = rng.gen_range(0..USER_AGENTS.len());

        let mut jitter = || {
            if browser.viewport_jitter == 0 {
                0
            } else {
                rng.gen_range(0..browser.viewport_jitter)
            }
        };
        let width = browser.base_viewport_width + jitter();
        let height = browser.base_viewport_height + jitter();

        Self {
            user_agent: USER_AGENTS[ua_idx].to_string(),
            viewport_width: width,
            viewport_height: height,
        }
    }
}
