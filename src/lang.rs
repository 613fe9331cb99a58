use crate::error::{AppError, Result};
use crate::types::Language;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use std::collections::HashMap;
use strum::IntoEnumIterator;
use unic_langid::LanguageIdentifier;

const EN_FTL: &str = r#"
response-time = { $seconds }s
"#;

const UK_FTL: &str = r#"
response-time = { $seconds } с
"#;

const DE_FTL: &str = r#"
response-time = { $seconds } Sekunden
"#;

fn source_for(language: Language) -> &'static str {
    match language {
        Language::English => EN_FTL,
        Language::Ukrainian => UK_FTL,
        Language::German => DE_FTL,
    }
}

pub struct TextManager {
    language: Language,
    bundles: HashMap<Language, FluentBundle<FluentResource>>,
}

impl TextManager {
    pub fn new(language: Language) -> Result<Self> {
        let mut bundles = HashMap::new();
        for lang in Language::iter() {
            bundles.insert(lang, Self::build_bundle(lang)?);
        }
        Ok(Self { language, bundles })
    }

    fn build_bundle(language: Language) -> Result<FluentBundle<FluentResource>> {
        let langid: LanguageIdentifier = language
            .code()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid language id {}: {}", language, e)))?;

        let resource = FluentResource::try_new(source_for(language).to_string())
            .map_err(|(_, errors)| {
                AppError::internal(format!("Broken {} strings: {:?}", language, errors))
            })?;

        let mut bundle = FluentBundle::new_concurrent(vec![langid]);
        // Plain text output, no bidi isolation marks around placeables.
        bundle.set_use_isolating(false);
        bundle.add_resource(resource).map_err(|errors| {
            AppError::internal(format!("Duplicate {} strings: {:?}", language, errors))
        })?;
        Ok(bundle)
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn get(&self, key: &str, args: Option<&FluentArgs>) -> String {
        let Some(bundle) = self.bundles.get(&self.language) else {
            return key.to_string();
        };
        let Some(pattern) = bundle.get_message(key).and_then(|m| m.value()) else {
            log::warn!("Missing {} string: {}", self.language, key);
            return key.to_string();
        };

        let mut errors = vec![];
        let text = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            log::warn!("Formatting {} failed: {:?}", key, errors);
        }
        text.into_owned()
    }

    /// Elapsed seconds with two decimals and the localized unit.
    pub fn response_time(&self, seconds: f64) -> String {
        let mut args = FluentArgs::new();
        args.set("seconds", format!("{:.2}", seconds));
        self.get("response-time", Some(&args))
    }
}
