//! Template Renderer - Personalizes campaign subject and body per target

use phishsim_storage::models::{Campaign, Target};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Final subject and body for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
}

/// Template renderer for campaign emails.
///
/// Substitutes the closed placeholder set `{{Name}}`, `{{Email}}`,
/// `{{Department}}`, `{{Role}}`, `{{Location}}`, `{{EmployeeID}}` and
/// `{{Manager}}` in subject and body, plus `{{Link}}` in the body only.
/// Unknown placeholders are left untouched. Rendering is pure.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    /// Public base URL for tracking links and beacons
    base_url: String,
}

impl TemplateRenderer {
    /// Create a new template renderer
    pub fn new(public_base_url: impl Into<String>) -> Self {
        let base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Per-target tracking link
    pub fn tracking_link(&self, token: &str) -> String {
        format!("{}/t/{}", self.base_url, token)
    }

    /// Per-target open beacon URL
    pub fn beacon_url(&self, token: &str) -> String {
        format!("{}/open/{}", self.base_url, token)
    }

    /// Render subject and body for a target of a campaign
    pub fn render_email(&self, campaign: &Campaign, target: &Target) -> RenderedEmail {
        RenderedEmail {
            subject: self.render_subject(&campaign.email_subject, target),
            html_body: self.render_body(&campaign.email_body, target),
        }
    }

    /// Render a subject line. `{{Link}}` is not substituted here.
    pub fn render_subject(&self, subject: &str, target: &Target) -> String {
        substitute(subject, target, None)
    }

    /// Render a body and append the open beacon
    pub fn render_body(&self, body: &str, target: &Target) -> String {
        let link = self.tracking_link(&target.token);
        let beacon = self.beacon_url(&target.token);
        self.render(body, target, &link, &beacon)
    }

    /// Render a body with an explicit link and beacon URL
    pub fn render(&self, template: &str, target: &Target, link: &str, beacon_url: &str) -> String {
        let mut result = substitute(template, target, Some(link));
        result.push_str(&format!(
            r#"<img src="{}" width="1" height="1" alt="" style="display:none" />"#,
            beacon_url
        ));
        result
    }
}

fn lookup<'a>(key: &str, target: &'a Target, link: Option<&'a str>) -> Option<&'a str> {
    let attr = |value: &'a Option<String>| Some(value.as_deref().unwrap_or(""));
    match key {
        "Name" => attr(&target.name),
        "Email" => Some(target.email.as_str()),
        "Department" => attr(&target.department),
        "Role" => attr(&target.role),
        "Location" => attr(&target.location),
        "EmployeeID" => attr(&target.employee_id),
        "Manager" => attr(&target.manager),
        "Link" => link,
        _ => None,
    }
}

/// Single pass over the template so substituted values are never rescanned
fn substitute(template: &str, target: &Target, link: Option<&str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];

        let replaced = after.find(CLOSE).and_then(|end| {
            lookup(&after[..end], target, link).map(|value| (value, &after[end + CLOSE.len()..]))
        });

        match replaced {
            Some((value, tail)) => {
                out.push_str(value);
                rest = tail;
            }
            None => {
                out.push_str(OPEN);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
