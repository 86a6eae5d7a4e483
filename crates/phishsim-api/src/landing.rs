//! Decoy landing page
//!
//! Rendered with minijinja. Every template is HTML auto-escaped, so target
//! attributes and the token cannot inject markup into the page.

use minijinja::{context, AutoEscape, Environment, Error as MiniJinjaError};
use phishsim_storage::models::Target;

const LANDING: &str = "landing";

/// Landing page renderer
pub struct LandingPage {
    env: Environment<'static>,
}

impl LandingPage {
    pub fn new() -> Result<Self, MiniJinjaError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_template(LANDING, include_str!("../templates/landing.html"))?;

        Ok(Self { env })
    }

    /// Render the credential form for a resolved target
    pub fn render(&self, target: &Target) -> Result<String, MiniJinjaError> {
        let template = self.env.get_template(LANDING)?;
        template.render(context! {
            token => &target.token,
            name => &target.name,
        })
    }
}
