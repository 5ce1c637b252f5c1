//! I18N Facade (spec §4.10).
//!
//! Translation tables live outside the core (an external lookup table keyed
//! by guild language); this module only exposes the `T(lang, key[, vars])`
//! operations against whatever table a `Catalog` implementation backs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use twilight_model::id::{marker::GuildMarker, Id};

/// A language tag, e.g. `"en-US"` or `"ja"`.
pub type Lang = String;

/// Looks up localized strings for a resolved language.
///
/// Implementors back onto the external lookup table described in spec §1;
/// the core never reaches into it directly.
pub trait Catalog: Send + Sync {
    /// Looks up the raw template for `key` in `lang`. Returns `None` if the
    /// key is missing so the facade can fall back to the key itself.
    fn lookup(&self, lang: &str, key: &str) -> Option<String>;
}

/// A `Catalog` backed by a static, in-process map, useful for tests and as
/// the default until an external table is wired in.
#[derive(Default)]
pub struct StaticCatalog {
    tables: HashMap<(String, String), String>,
}

impl StaticCatalog {
    pub fn new() -> StaticCatalog {
        StaticCatalog::default()
    }

    pub fn insert(&mut self, lang: impl Into<String>, key: impl Into<String>, value: impl Into<String>) {
        self.tables.insert((lang.into(), key.into()), value.into());
    }
}

impl Catalog for StaticCatalog {
    fn lookup(&self, lang: &str, key: &str) -> Option<String> {
        self.tables.get(&(lang.to_string(), key.to_string())).cloned()
    }
}

/// The I18N facade. Thread-safe, effectively pure beyond the per-guild
/// language resolution cache.
pub struct I18n {
    catalog: Arc<dyn Catalog>,
    resolved_lang: RwLock<HashMap<Id<GuildMarker>, Lang>>,
}

impl I18n {
    pub fn new(catalog: Arc<dyn Catalog>) -> I18n {
        I18n {
            catalog,
            resolved_lang: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves and caches the language for a guild. Subsequent calls within
    /// the same session reuse the cached value (spec: "resolved once per
    /// session (per guild) and cached").
    pub async fn resolve_lang(&self, guild_id: Id<GuildMarker>, fetched: impl FnOnce() -> Lang) -> Lang {
        if let Some(lang) = self.resolved_lang.read().await.get(&guild_id) {
            return lang.clone();
        }

        let lang = fetched();
        self.resolved_lang.write().await.insert(guild_id, lang.clone());
        lang
    }

    /// `T(lang, key)`. Missing key falls back to the key itself.
    pub fn t(&self, lang: &str, key: &str) -> String {
        self.catalog.lookup(lang, key).unwrap_or_else(|| key.to_string())
    }

    /// `T(lang, key, vars)`. Missing variables leave the `{placeholder}`
    /// literal in place.
    pub fn t_vars(&self, lang: &str, key: &str, vars: &HashMap<&str, String>) -> String {
        let template = self.t(lang, key);
        let mut out = String::with_capacity(template.len());
        let mut chars = template.char_indices().peekable();

        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = template[i..].find('}') {
                    let name = &template[i + 1..i + end];
                    if let Some(value) = vars.get(name) {
                        out.push_str(value);
                        i += end + 1;
                        continue;
                    }
                }
            }
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        let _ = &mut chars;

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> I18n {
        let mut catalog = StaticCatalog::new();
        catalog.insert("en", "onboarding.error.all_busy", "all bots busy — try again later");
        catalog.insert("en", "onboarding.welcome", "Welcome, {name}!");
        I18n::new(Arc::new(catalog))
    }

    #[test]
    fn returns_key_on_miss() {
        let i18n = facade();
        assert_eq!(i18n.t("en", "missing.key"), "missing.key");
    }

    #[test]
    fn substitutes_known_vars() {
        let i18n = facade();
        let mut vars = HashMap::new();
        vars.insert("name", "Alice".to_string());
        assert_eq!(i18n.t_vars("en", "onboarding.welcome", &vars), "Welcome, Alice!");
    }

    #[test]
    fn leaves_missing_placeholder_literal() {
        let i18n = facade();
        let vars = HashMap::new();
        assert_eq!(i18n.t_vars("en", "onboarding.welcome", &vars), "Welcome, {name}!");
    }

    #[tokio::test]
    async fn resolves_lang_once_and_caches() {
        let i18n = facade();
        let guild = Id::new(1);

        let calls = std::sync::atomic::AtomicUsize::new(0);
        let lang1 = i18n.resolve_lang(guild, || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            "en".to_string()
        }).await;
        let lang2 = i18n.resolve_lang(guild, || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            "ja".to_string()
        }).await;

        assert_eq!(lang1, "en");
        assert_eq!(lang2, "en");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
