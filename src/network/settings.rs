use super::HttpClientConfig;

/// Network settings applied to every source adapter
#[derive(Clone, Debug)]
pub struct NetworkSettings {
    pub client: HttpClientConfig,

    /// Number of retry attempts for failed requests
    pub retries: u32,

    /// Upper bound on archive pages fetched per request
    pub max_pages: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            client: HttpClientConfig::default(),
            retries: 3,
            max_pages: 10,
        }
    }
}

impl NetworkSettings {
    pub fn from_args(args: &crate::cli::Args) -> Self {
        NetworkSettings {
            client: HttpClientConfig {
                timeout: args.timeout,
                insecure: args.insecure,
                random_agent: args.random_agent,
                proxy: args.proxy.clone(),
                proxy_auth: args.proxy.as_ref().and(args.proxy_auth.clone()),
            },
            retries: args.retries,
            max_pages: args.max_pages,
        }
    }
}
