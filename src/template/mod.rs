//! Template Resolver Adapter (spec.md §4.B, external interface in §6).
//!
//! The actual `{{...}}` templating engine (secret/configmap lookups,
//! `fromSecret`/`fromConfigmap`/`fromClusterClaim` functions) lives outside
//! this crate's scope — spec.md §1 explicitly calls the dynamic-watcher and
//! templating library out of scope, summarizing only their contract. This
//! module adapts that contract: detecting template syntax, resolving a raw
//! object against a [`TemplateResolver`], and managing the 2-slot encryption
//! key cache described in spec.md §5.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::Engine;
use thiserror::Error;

/// Errors the resolver can surface while decrypting `{{fromSecret ...}}`
/// values that were AES-encrypted at rest (spec.md §6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("AES key is invalid")]
    InvalidAESKey,
    #[error("no AES key is set")]
    AESKeyNotSet,
    #[error("initialization vector is invalid")]
    InvalidIV,
    #[error("PKCS7 padding is invalid")]
    InvalidPKCS7Padding,
    #[error("failed to parse template: {0}")]
    ParseError(String),
    #[error("hub-templates are not resolvable by this controller: {0}")]
    HubTemplate(String),
}

/// `HasTemplate(raw, delim, exact)`: whether `raw` contains unresolved
/// template syntax using the given delimiter pair.
pub fn has_template(raw: &str, delimiter: &str) -> bool {
    raw.contains(delimiter)
}

/// Detects the `{{hub ... hub}}` prefix, which this controller never
/// resolves itself (that's the hub cluster's job) — spec.md §4.D: "`{{hub`
/// literal -> fail with hub-templates error".
pub fn has_hub_template(raw: &str) -> bool {
    raw.contains("{{hub")
}

/// Data made available to template resolution: the namespace the policy
/// lives in (secrets/configmaps are looked up there) plus any extra context.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub namespace: String,
}

/// The external templating contract summarized in spec.md §6:
/// `NewResolver(kubeClient, cfg) -> resolver`,
/// `resolver.ResolveTemplate(raw, data, opts) -> {resolvedJSON}`.
pub trait TemplateResolver: Send + Sync {
    fn resolve_template(&self, raw: &str, ctx: &TemplateContext) -> Result<String, TemplateError>;
}

/// A resolver that performs no substitution; used when a template has no
/// `{{...}}` expressions at all, so §4.D never has to call through the real
/// adapter for the common case.
pub struct NoopResolver;

impl TemplateResolver for NoopResolver {
    fn resolve_template(&self, raw: &str, _ctx: &TemplateContext) -> Result<String, TemplateError> {
        Ok(raw.to_string())
    }
}

/// The 2-slot (current, previous) encryption key cache described in spec.md
/// §5: "encryption-key cache has 2 slots (current,previous), invalidated on
/// AES errors".
#[derive(Debug, Clone, Default)]
pub struct EncryptionKeyCache {
    inner: Arc<RwLock<HashMap<String, (Option<Vec<u8>>, Option<Vec<u8>>)>>>,
}

impl EncryptionKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str) -> Option<(Option<Vec<u8>>, Option<Vec<u8>>)> {
        self.inner.read().ok()?.get(namespace).cloned()
    }

    pub fn set(&self, namespace: &str, current: Vec<u8>) {
        if let Ok(mut cache) = self.inner.write() {
            let previous = cache.get(namespace).and_then(|(c, _)| c.clone());
            cache.insert(namespace.to_string(), (Some(current), previous));
        }
    }

    /// Clear the cache entry for a namespace. Called when an AES error
    /// occurs (spec.md §4.D / §7: "AES errors clear cache + report
    /// NonCompliant" and "clear cache once + one retry").
    pub fn invalidate(&self, namespace: &str) {
        if let Ok(mut cache) = self.inner.write() {
            cache.remove(namespace);
        }
    }
}

/// Validates an AES-256 key decoded from base64, the way the resolver would
/// before attempting a decrypt. This crate does not perform the decrypt
/// itself (that's the external templating library's job per spec.md §6);
/// it only needs to recognize and react to the error kinds it defines.
pub fn validate_aes_key(b64_key: &str) -> Result<Vec<u8>, TemplateError> {
    let key = base64::engine::general_purpose::STANDARD
        .decode(b64_key)
        .map_err(|_| TemplateError::InvalidAESKey)?;

    if !matches!(key.len(), 16 | 24 | 32) {
        return Err(TemplateError::InvalidAESKey);
    }

    Ok(key)
}

pub fn validate_iv(b64_iv: &str) -> Result<Vec<u8>, TemplateError> {
    let iv = base64::engine::general_purpose::STANDARD
        .decode(b64_iv)
        .map_err(|_| TemplateError::InvalidIV)?;

    if iv.len() != 16 {
        return Err(TemplateError::InvalidIV);
    }

    Ok(iv)
}

/// Resolve a raw object template (spec.md §4.D step 4): hub templates are
/// rejected outright, templates with no `{{` are returned unchanged, and
/// anything else goes through the resolver.
pub fn resolve_object_template(
    raw: &str,
    resolver: &dyn TemplateResolver,
    ctx: &TemplateContext,
    hub_template_annotation_message: Option<&str>,
) -> Result<String, TemplateError> {
    if has_hub_template(raw) {
        let message = hub_template_annotation_message
            .map(str::to_string)
            .unwrap_or_else(|| {
                "this object template contains hub-templates, which are resolved on the \
                 hub cluster and are not supported for direct use"
                    .to_string()
            });
        return Err(TemplateError::HubTemplate(message));
    }

    if !has_template(raw, "{{") {
        return Ok(raw.to_string());
    }

    resolver.resolve_template(raw, ctx)
}
