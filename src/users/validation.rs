//! Field validation and its localized messages.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use validator::{Validate, ValidationError};

use crate::problem::FieldError;

/// Languages the validation messages are available in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Fr,
}

impl Lang {
    /// First language range of `Accept-Language`, English when absent or
    /// unsupported.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(axum::http::header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|range| range.split(';').next().unwrap_or("").trim())
            .map(Self::from_tag)
            .unwrap_or_default()
    }

    pub fn from_tag(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or("");
        if primary.eq_ignore_ascii_case("fr") {
            Lang::Fr
        } else {
            Lang::En
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Fr => "fr",
        }
    }

    fn message(self, error: &ValidationError) -> String {
        let param = |name: &str| {
            error
                .params
                .get(name)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".into())
        };
        match (self, error.code.as_ref()) {
            (Lang::En, "length") => {
                format!("size must be between {} and {}", param("min"), param("max"))
            }
            (Lang::Fr, "length") => format!(
                "la taille doit être comprise entre {} et {}",
                param("min"),
                param("max")
            ),
            (Lang::En, "email") => "must be a well-formed email address".into(),
            (Lang::Fr, "email") => {
                "doit être une adresse électronique syntaxiquement correcte".into()
            }
            (Lang::En, "pattern") => "must match the login pattern".into(),
            (Lang::Fr, "pattern") => "doit correspondre au format d'identifiant".into(),
            (Lang::En, "must_match") => "passwords do not match".into(),
            (Lang::Fr, "must_match") => "les mots de passe ne correspondent pas".into(),
            (Lang::En, "not_blank") => "must not be blank".into(),
            (Lang::Fr, "not_blank") => "ne doit pas être vide".into(),
            (_, code) => error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| code.to_string()),
        }
    }
}

/// `Accept-Language` resolved to a supported [`Lang`]; never rejects.
pub struct AcceptLanguage(pub Lang);

#[async_trait]
impl<S> FromRequestParts<S> for AcceptLanguage
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(AcceptLanguage(Lang::from_headers(&parts.headers)))
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Runs the payload's constraints and returns one record per violation,
/// ordered by field. Empty means the payload is valid.
pub fn field_errors<T: Validate>(payload: &T, object_name: &str, lang: Lang) -> Vec<FieldError> {
    let Err(errors) = payload.validate() else {
        return Vec::new();
    };
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = camel_case(field.as_ref());
            errs.iter()
                .map(move |e| FieldError::new(object_name, &field, lang.message(e)))
                .collect::<Vec<_>>()
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.message.cmp(&b.message)));
    out.dedup();
    out
}
