// src/common/i18n.rs

use std::collections::HashMap;

use anyhow::Context;

// Idioma usado quando o pedido não traz um idioma conhecido
pub const DEFAULT_LANG: &str = "pt";

const BUNDLES: &[(&str, &str)] = &[
    ("pt", include_str!("../../locales/pt.json")),
    ("en", include_str!("../../locales/en.json")),
];

/// Mensagens traduzidas, indexadas por idioma e depois por chave
/// (ex: "errors.deal_not_found").
#[derive(Debug, Clone, Default)]
pub struct I18nStore {
    messages: HashMap<String, HashMap<String, String>>,
}

impl I18nStore {
    pub fn load() -> anyhow::Result<Self> {
        let mut messages = HashMap::new();

        for (lang, raw) in BUNDLES {
            let bundle: HashMap<String, String> = serde_json::from_str(raw)
                .with_context(|| format!("Arquivo de tradução '{}' inválido", lang))?;
            messages.insert(lang.to_string(), bundle);
        }

        Ok(Self { messages })
    }

    /// Traduz a chave no idioma pedido, caindo para o português e,
    /// em último caso, devolvendo a própria chave.
    pub fn translate(&self, lang: &str, key: &str) -> String {
        self.lookup(lang, key)
            .or_else(|| self.lookup(DEFAULT_LANG, key))
            .unwrap_or(key)
            .to_string()
    }

    pub fn supports(&self, lang: &str) -> bool {
        self.messages.contains_key(lang)
    }

    fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        self.messages.get(lang)?.get(key).map(String::as_str)
    }
}
