//! Pattern catalog for classifying malicious requests.
//!
//! This module compiles the classification rules for request paths,
//! query strings and user-agent headers once at construction time and
//! exposes a pure, first-match-wins classifier over them.

use crate::models::InspectionConfig;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while building the pattern catalog
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("invalid pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Which part of the request a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleCategory {
    Path,
    Query,
    UserAgent,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Path => write!(f, "path"),
            RuleCategory::Query => write!(f, "query"),
            RuleCategory::UserAgent => write!(f, "user-agent"),
        }
    }
}

/// A classified violation: the matching category and the rule that hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub category: RuleCategory,
    pub label: String,
}

/// Rule sources for the three request dimensions
#[derive(Debug, Clone)]
pub struct PatternRules {
    pub path: Vec<String>,
    pub query: Vec<String>,
    pub user_agent: Vec<String>,
}

fn strings(sources: &[&str]) -> Vec<String> {
    sources.iter().map(|s| (*s).to_string()).collect()
}

impl Default for PatternRules {
    fn default() -> Self {
        Self {
            // Paths that should never be requested on this API
            path: strings(&[
                // Version control
                r"\.git",
                r"\.svn",
                r"\.hg",
                r"\.bzr",
                // Configuration files
                r"\.env",
                r"\.htaccess",
                r"\.htpasswd",
                r"wp-config\.php",
                r"config\.php",
                r"settings\.php",
                r"credentials",
                // PHP exploits (CVE-2017-9841 and friends)
                r"vendor/phpunit",
                r"eval-stdin\.php",
                r"phpunit",
                r"\.php$",
                r"\.phtml",
                r"\.php3",
                r"\.php4",
                r"\.php5",
                r"\.php7",
                r"\.phps",
                // Framework probes
                r"thinkphp",
                r"index\.php",
                r"invokefunction",
                r"call_user_func",
                r"laravel",
                r"artisan",
                r"\.blade\.php",
                // Docker/container exposure
                r"containers/json",
                r"docker\.sock",
                r"v1\.\d+/containers",
                // Router/IoT exploitation
                r"luci",
                r"cgi-bin",
                r"goform",
                r"formlogin",
                r"developmentserver",
                r"metadatauploader",
                // WordPress
                r"wp-admin",
                r"wp-content",
                r"wp-includes",
                r"wp-login",
                r"xmlrpc\.php",
                // Shells / remote code execution
                r"shell",
                r"cmd\.php",
                r"c99",
                r"r57",
                // Backups and dumps
                r"\.sql$",
                r"\.bak$",
                r"\.old$",
                r"\.backup$",
                r"\.tar$",
                r"\.tar\.gz$",
                r"\.rar$",
                r"dump",
                // Admin panels
                r"phpmyadmin",
                r"adminer",
                r"manager/html",
                r"admin\.php",
                // Other scripting languages
                r"\.asp$",
                r"\.aspx$",
                r"\.jsp$",
                r"\.cgi$",
                r"\.pl$",
                // Misc probes
                r"well-known/security",
                r"actuator",
                r"/bins/",
            ]),
            // Query strings carrying injection payloads
            query: strings(&[
                r"allow_url_include",
                r"auto_prepend_file",
                r"php://input",
                r"php://filter",
                r"expect://",
                r"data://text",
                r"file://",
                r"glob://",
                r"phar://",
                r"zip://",
                r"union\s+select",
                r"<script",
                r"javascript:",
                r"onerror\s*=",
                r"onclick\s*=",
                r"onload\s*=",
                r"onmouseover\s*=",
                r"eval\(",
                r"base64_decode",
                r"exec\(",
                r"system\(",
                r"passthru\(",
                r"pearcmd",
            ]),
            // Known scanner user agents
            user_agent: strings(&[
                r"sqlmap",
                r"nikto",
                r"nmap",
                r"masscan",
                r"zgrab",
                r"gobuster",
                r"dirbuster",
                r"wpscan",
                r"nessus",
                r"openvas",
                r"acunetix",
                r"qualys",
                r"nuclei",
                r"httpx",
                r"python-requests.*scan",
                r"curl.*scan",
            ]),
        }
    }
}

impl PatternRules {
    /// Built-in catalog extended with the configured extra rules
    pub fn from_config(config: &InspectionConfig) -> Self {
        let mut rules = Self::default();
        rules.path.extend(config.extra_path_rules.iter().cloned());
        rules.query.extend(config.extra_query_rules.iter().cloned());
        rules
            .user_agent
            .extend(config.extra_user_agent_rules.iter().cloned());
        rules
    }
}

/// Compiled classification rules. Immutable once built; classification
/// is a pure function over the rule set.
pub struct PatternCatalog {
    path: Vec<Regex>,
    query: Vec<Regex>,
    user_agent: Vec<Regex>,
}

fn compile(sources: &[String]) -> Result<Vec<Regex>, PatternError> {
    sources
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| PatternError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

impl PatternCatalog {
    /// Compile a catalog from rule sources
    pub fn new(rules: PatternRules) -> Result<Self, PatternError> {
        Ok(Self {
            path: compile(&rules.path)?,
            query: compile(&rules.query)?,
            user_agent: compile(&rules.user_agent)?,
        })
    }

    /// Compile the built-in catalog plus any configured extra rules
    pub fn from_config(config: &InspectionConfig) -> Result<Self, PatternError> {
        Self::new(PatternRules::from_config(config))
    }

    /// Classify a request against the catalog.
    ///
    /// Path rules are checked first, then query rules, then user-agent
    /// rules; the first matching rule wins. Returns `None` for a clean
    /// request.
    pub fn classify(&self, path: &str, query: &str, user_agent: &str) -> Option<Violation> {
        for (category, patterns, subject) in [
            (RuleCategory::Path, &self.path, path),
            (RuleCategory::Query, &self.query, query),
            (RuleCategory::UserAgent, &self.user_agent, user_agent),
        ] {
            for pattern in patterns {
                if pattern.is_match(subject) {
                    return Some(Violation {
                        category,
                        label: pattern.as_str().to_string(),
                    });
                }
            }
        }

        None
    }
}
