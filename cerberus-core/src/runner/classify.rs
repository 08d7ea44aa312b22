//! Error classification for reviewer runtime failures
//!
//! A pure function over (exit code, captured stdout+stderr) that maps child
//! process failures onto the retry/fallback taxonomy. Auth and quota errors
//! never trigger fallback: the same key applies to every model in the chain.

use std::sync::LazyLock;

use regex::Regex;

/// Transient failure classes: retry with backoff, then fall back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientClass {
    RateLimit,
    Server5xx,
    Network,
    ProviderGeneric,
    EmptyOutput,
}

impl TransientClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientClass::RateLimit => "rate_limit",
            TransientClass::Server5xx => "server_5xx",
            TransientClass::Network => "network",
            TransientClass::ProviderGeneric => "provider_generic",
            TransientClass::EmptyOutput => "empty_output",
        }
    }
}

/// Permanent failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentClass {
    /// Invalid key or depleted credits; no fallback, same key everywhere
    AuthOrQuota,
    /// Non-429 4xx; this model rejects the request, the next may not
    Client4xx,
}

impl PermanentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermanentClass::AuthOrQuota => "auth_or_quota",
            PermanentClass::Client4xx => "client_4xx",
        }
    }
}

/// Outcome classification of one runtime attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Timeout,
    Transient {
        class: TransientClass,
        retry_after_seconds: Option<u64>,
    },
    Permanent {
        class: PermanentClass,
    },
    Unknown,
}

impl Classification {
    pub fn is_transient(&self) -> bool {
        matches!(self, Classification::Transient { .. })
    }

    pub fn is_auth_or_quota(&self) -> bool {
        matches!(
            self,
            Classification::Permanent {
                class: PermanentClass::AuthOrQuota
            }
        )
    }
}

static AUTH_OR_QUOTA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"incorrect_api_key|invalid_api_key|invalid.api.key|exceeded_current_quota|insufficient_quota|insufficient.credits|payment.required|quota.exceeded|credits.depleted|credits.exhausted|no credentials found|authentication failed|unauthorized|missing authentication header|http[^0-9]*401",
    )
    .expect("auth/quota pattern")
});

static RATE_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rate.limit|too many requests|retry-after|http[^0-9]*429|error[^0-9]*429")
        .expect("rate limit pattern")
});

static SERVER_5XX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"http[^0-9]*5[0-9]{2}|error[^0-9]*5[0-9]{2}|service.unavailable|temporarily.unavailable",
    )
    .expect("5xx pattern")
});

static NETWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"network.*(error|timeout|unreachable)|timed out|timeout while|connection (reset|refused|aborted)|temporary failure|tls handshake timeout|econn(reset|refused)|enotfound|broken pipe|remote end closed connection",
    )
    .expect("network pattern")
});

static PROVIDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"provider returned error|provider.error|upstream.error|model.error")
        .expect("provider pattern")
});

static CLIENT_4XX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"http[^0-9]*4([0-1][0-9]|2[0-8]|[3-9][0-9])|error[^0-9]*4([0-1][0-9]|2[0-8]|[3-9][0-9])",
    )
    .expect("4xx pattern")
});

static RETRY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)retry[-_ ]after["' ]*[:=][ ]*(\d+)"#).expect("retry-after pattern")
});

/// Classify the outcome of a runtime attempt
pub fn classify(exit_code: i32, stdout: &str, stderr: &str) -> Classification {
    if exit_code == 0 {
        return Classification::Success;
    }
    if exit_code == 124 {
        return Classification::Timeout;
    }

    let combined = format!("{}\n{}", stdout, stderr).to_lowercase();

    if AUTH_OR_QUOTA_RE.is_match(&combined) {
        return Classification::Permanent {
            class: PermanentClass::AuthOrQuota,
        };
    }
    if RATE_LIMIT_RE.is_match(&combined) {
        return Classification::Transient {
            class: TransientClass::RateLimit,
            retry_after_seconds: extract_retry_after(&combined),
        };
    }
    if SERVER_5XX_RE.is_match(&combined) {
        return Classification::Transient {
            class: TransientClass::Server5xx,
            retry_after_seconds: None,
        };
    }
    if NETWORK_RE.is_match(&combined) {
        return Classification::Transient {
            class: TransientClass::Network,
            retry_after_seconds: None,
        };
    }
    if PROVIDER_RE.is_match(&combined) {
        return Classification::Transient {
            class: TransientClass::ProviderGeneric,
            retry_after_seconds: None,
        };
    }
    if CLIENT_4XX_RE.is_match(&combined) {
        return Classification::Permanent {
            class: PermanentClass::Client4xx,
        };
    }

    Classification::Unknown
}

/// A `Retry-After` hint found in provider output, in seconds
pub fn extract_retry_after(text: &str) -> Option<u64> {
    let captures = RETRY_AFTER_RE.captures(text)?;
    let value: u64 = captures.get(1)?.as_str().parse().ok()?;
    (value > 0).then_some(value)
}

/// Specific API-error titles surfaced in SKIP verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorTitle {
    ApiKeyInvalid,
    ApiCreditsDepleted,
    ApiError,
}

impl ApiErrorTitle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorTitle::ApiKeyInvalid => "API_KEY_INVALID",
            ApiErrorTitle::ApiCreditsDepleted => "API_CREDITS_DEPLETED",
            ApiErrorTitle::ApiError => "API_ERROR",
        }
    }
}

static KEY_INVALID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"incorrect_api_key|invalid_api_key|invalid.api.key|authentication|unauthorized|401|missing authentication header",
    )
    .expect("key invalid pattern")
});

static CREDITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"exceeded_current_quota|insufficient_quota|insufficient.credits|payment.required|quota.exceeded|credits.depleted|credits.exhausted|402",
    )
    .expect("credits pattern")
});

/// Pick the specific API-error title for surfaced error text
pub fn classify_api_error_title(text: &str) -> ApiErrorTitle {
    let lower = text.to_lowercase();
    if KEY_INVALID_RE.is_match(&lower) {
        ApiErrorTitle::ApiKeyInvalid
    } else if CREDITS_RE.is_match(&lower) {
        ApiErrorTitle::ApiCreditsDepleted
    } else {
        ApiErrorTitle::ApiError
    }
}

static BEARER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(authorization\s*:\s*bearer\s+)\S+").expect("bearer pattern")
});

static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)((?:api|access|secret|auth)[_-]?key\s*[:=]\s*)[^\s,;]+")
        .expect("key/value pattern")
});

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(token\s*[:=]\s*)[^\s,;]+").expect("token pattern"));

/// Mask secrets before error text is surfaced in logs or PR comments
pub fn redact_secrets(text: &str) -> String {
    let redacted = BEARER_RE.replace_all(text, "${1}<redacted>");
    let redacted = KEY_VALUE_RE.replace_all(&redacted, "${1}<redacted>");
    TOKEN_RE.replace_all(&redacted, "${1}<redacted>").into_owned()
}
