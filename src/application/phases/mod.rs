//! The standard request phases, in the order they run.

mod cache;
mod database;
mod localization;
mod member;
mod request;
mod sanitize;
mod session;
mod settings;

pub use cache::BuildSnapshots;
pub use database::OpenDatabase;
pub use localization::LoadLocalization;
pub use member::ResolveMember;
pub use request::ResolveRequest;
pub use sanitize::{SanitizeInput, escape_html};
pub use session::StartSession;
pub use settings::LoadSettings;

use crate::application::{
    context::RequestContext,
    pipeline::{Dispatcher, Pipeline, RouteTable},
};

/// sanitize → database → cache → settings → request → session → member →
/// localization → dispatch.
pub fn standard_pipeline(routes: RouteTable) -> Pipeline<RequestContext> {
    let mut pipeline = Pipeline::new(Dispatcher::new(routes));
    pipeline
        .add_middleware(SanitizeInput)
        .add_middleware(OpenDatabase)
        .add_middleware(BuildSnapshots)
        .add_middleware(LoadSettings)
        .add_middleware(ResolveRequest)
        .add_middleware(StartSession)
        .add_middleware(ResolveMember)
        .add_middleware(LoadLocalization);
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_order() {
        let pipeline = standard_pipeline(RouteTable::new());
        assert_eq!(
            pipeline.names(),
            vec![
                "sanitize",
                "database",
                "cache",
                "settings",
                "request",
                "session",
                "member",
                "localization"
            ]
        );
    }
}
