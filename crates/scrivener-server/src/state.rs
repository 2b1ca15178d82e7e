use scrivener_core::TranslationService;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub service: TranslationService,
}
