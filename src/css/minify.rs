use super::rules::Stylesheet;
use crate::stylesheets::StylesheetSource;

type ValueTransform<'a> = Box<dyn Fn(&str, &str) -> Option<String> + 'a>;

/// Concatenates and minifies ordered stylesheet sources.
///
/// Comments and insignificant whitespace are removed. Rules are never merged
/// or reordered, since source order carries override precedence across files.
#[derive(Default)]
pub struct Minifier<'a> {
    transform: Option<ValueTransform<'a>>,
}

impl<'a> Minifier<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a per-declaration hook `(property, value) -> replacement`.
    /// Returning `None` keeps the value.
    pub fn with_value_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str, &str) -> Option<String> + 'a,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Rewrite every occurrence of a staging-only path token, e.g. `tmp/` -> `../`
    pub fn with_path_rewrite(self, token: &'a str, replacement: &'a str) -> Self {
        self.with_value_transform(move |_, value| {
            value
                .contains(token)
                .then(|| value.replace(token, replacement))
        })
    }

    /// Minify one CSS text
    pub fn minify(&self, css: &str) -> Stylesheet {
        let mut sheet = Stylesheet::parse(css);
        if let Some(transform) = &self.transform {
            sheet.for_each_declaration_mut(|declaration| {
                if let Some(value) = transform(&declaration.property, &declaration.value) {
                    declaration.value = value;
                }
            });
        }
        sheet
    }

    /// Minify sources in the given order into one stylesheet.
    ///
    /// Each source is parsed on its own so an unbalanced block in one file
    /// cannot swallow rules of the next.
    pub fn minify_sources(&self, sources: &[StylesheetSource]) -> Stylesheet {
        let mut combined = Stylesheet::default();
        for source in sources {
            let sheet = self.minify(&source.content);
            ::log::debug!(
                "Minified {} into {} rules",
                source.scratch_name(),
                sheet.rule_count()
            );
            combined.extend(sheet);
        }
        combined
    }
}
