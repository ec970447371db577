use crate::u2f::ApplicationParameter;

#[derive(Debug, Clone)]
pub struct PresencePrompt {
    pub title: String,
    pub description: String,
}

// The token only sees the application parameter, never the origin string.
fn short_app(application: &ApplicationParameter) -> String {
    hex::encode(&application.as_bytes()[..8])
}

pub(crate) fn register_prompt(application: &ApplicationParameter) -> PresencePrompt {
    PresencePrompt {
        title: "u2fkey".to_string(),
        description: format!(
            "Register new key\n\nApplication: {}\n\nPress OK to touch the token, or Cancel to deny.",
            short_app(application)
        ),
    }
}

pub(crate) fn authenticate_prompt(application: &ApplicationParameter) -> PresencePrompt {
    PresencePrompt {
        title: "u2fkey".to_string(),
        description: format!(
            "Sign with key\n\nApplication: {}\n\nPress OK to touch the token, or Cancel to deny.",
            short_app(application)
        ),
    }
}
