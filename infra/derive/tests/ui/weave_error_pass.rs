use std::borrow::Cow;
use weave_derive::weave_error;

#[weave_error]
pub enum ResolveError {
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Missing contract{}: {key}", format_context(.context))]
    Missing { key: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn lookup(key: &'static str) -> Result<(), ResolveError> {
    Err(ResolveError::Missing { key: key.into(), context: None })
}

fn main() {
    let err = lookup("logger").context("resolving feature a").unwrap_err();
    assert_eq!(err.context_message(), Some("resolving feature a"));
    assert_eq!(err.to_string(), "Missing contract (resolving feature a): logger");

    let internal: ResolveError = "boom".into();
    assert!(internal.context_message().is_none());

    let io: Result<(), std::io::Error> = Err(std::io::Error::other("disk"));
    let wrapped = io.context("reading manifest").unwrap_err();
    assert!(matches!(wrapped, ResolveError::Io { .. }));
}
