use robotstxt::DefaultMatcher;
use trawl_core::traits::{Fetcher, RobotsPolicy};
use url::Url;

/// Robots exclusion policy backed by a site's `/robots.txt`.
///
/// An unreachable or missing robots.txt allows everything.
pub struct RobotsTxtPolicy {
    body: String,
    user_agent: String,
}

impl RobotsTxtPolicy {
    pub fn from_body(body: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Fetch `<base_url>/robots.txt` and build a policy from it.
    pub async fn load<F: Fetcher>(fetcher: &F, base_url: &str, user_agent: &str) -> Self {
        let robots_url = match Url::parse(base_url).and_then(|base| base.join("/robots.txt")) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(base_url, error = %e, "Cannot derive robots.txt URL, allowing all");
                return Self::from_body("", user_agent);
            }
        };

        match fetcher.fetch(robots_url.as_str()).await {
            Ok(body) => {
                tracing::info!(url = %robots_url, bytes = body.len(), "Loaded robots.txt");
                Self::from_body(body, user_agent)
            }
            Err(e) => {
                tracing::warn!(
                    url = %robots_url,
                    error = %e,
                    "robots.txt unavailable, allowing all"
                );
                Self::from_body("", user_agent)
            }
        }
    }
}

impl RobotsPolicy for RobotsTxtPolicy {
    fn is_allowed(&self, url: &str) -> bool {
        if self.body.trim().is_empty() {
            return true;
        }
        // The matcher borrows the body, so it cannot outlive this call.
        DefaultMatcher::default().one_agent_allowed_by_robots(&self.body, &self.user_agent, url)
    }
}
