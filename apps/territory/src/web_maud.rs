use maud::{DOCTYPE, Markup, PreEscaped, html};

use crate::reveal::RevealCopy;

#[derive(Debug, Clone)]
pub struct RevealView {
    pub site_name: String,
    pub business_name: String,
    pub category: String,
    pub zip: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub copy: RevealCopy,
    pub preview: bool,
}

#[derive(Debug, Clone)]
pub struct LandingView {
    pub site_name: String,
    pub category: String,
    pub zip: String,
    pub reveal_href: String,
    pub preview: bool,
}

pub fn render_reveal_page(view: &RevealView) -> String {
    let title = format!("{} | Best {} in {}", view.business_name, view.category, view.zip);
    let body = html! {
        section class="lp-card lp-reveal" {
            @if view.preview { (preview_ribbon()) }
            p class="lp-eyebrow" { "Our pick for " (view.category) " in " (view.zip) }
            h1 { (view.business_name) }
            @if let Some(rating) = view.rating {
                p class="lp-rating" {
                    (format!("{rating:.1}")) " ★"
                    @if let Some(count) = view.review_count {
                        span class="lp-muted" { " · " (count) " reviews" }
                    }
                }
            }
            @if !view.copy.bullets.is_empty() {
                ul class="lp-trust" {
                    @for bullet in &view.copy.bullets {
                        li { (bullet) }
                    }
                }
            }
            @if !view.copy.area_list.is_empty() {
                p class="lp-territory" {
                    strong { "Serving: " }
                    (view.copy.area_list)
                }
            }
            dl class="lp-contact" {
                @if let Some(address) = &view.address {
                    dt { "Address" } dd { (address) }
                }
                @if let Some(phone) = &view.phone {
                    dt { "Phone" } dd { a href={ "tel:" (phone) } { (phone) } }
                }
                @if let Some(website) = &view.website {
                    dt { "Website" } dd { a href=(website) rel="nofollow noopener" { (website) } }
                }
            }
        }
    };
    render_shell(&view.site_name, &title, &body)
}

/// Informational landing page; carries no listing data.
pub fn render_landing_page(view: &LandingView) -> String {
    let title = format!("Best {} in {}", view.category, view.zip);
    let body = html! {
        section class="lp-card lp-landing" {
            @if view.preview { (preview_ribbon()) }
            h1 { (title) }
            p {
                "We feature exactly one " (view.category.to_lowercase())
                " per neighbourhood. No paid rankings, no endless lists."
            }
            a class="lp-btn" href=(view.reveal_href) { "See our pick" }
        }
    };
    render_shell(&view.site_name, &title, &body)
}

pub fn render_not_available_page(site_name: &str, category: &str, zip: &str) -> String {
    let body = html! {
        section class="lp-card lp-empty" {
            h1 { "Not currently available" }
            p class="lp-muted" {
                "There is no featured " (category.to_lowercase()) " for " (zip) " right now."
            }
        }
    };
    render_shell(site_name, "Not currently available", &body)
}

pub fn render_error_page(site_name: &str, heading: &str, detail: &str) -> String {
    let body = html! {
        section class="lp-card lp-error" {
            h1 { (heading) }
            p class="lp-muted" { (detail) }
        }
    };
    render_shell(site_name, heading, &body)
}

fn preview_ribbon() -> Markup {
    html! {
        div class="lp-ribbon" { "Preview" }
    }
}

fn render_shell(site_name: &str, title: &str, body: &Markup) -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " | " (site_name) }
                style { (PreEscaped(styles())) }
            }
            body {
                header class="lp-topbar" {
                    div class="lp-brand" { (site_name) }
                }
                main class="lp-main" {
                    (body)
                }
            }
        }
    };
    markup.into_string()
}

fn styles() -> &'static str {
    r"
:root {
  --bg: #f7f5f0;
  --panel: #ffffff;
  --text: #1d2330;
  --muted: #6a7285;
  --accent: #1f7a5c;
}
* { box-sizing: border-box; }
body { margin: 0; background: var(--bg); color: var(--text); font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; }
.lp-topbar { padding: 16px 24px; font-weight: 700; letter-spacing: 0.02em; }
.lp-main { max-width: 680px; margin: 24px auto; padding: 0 16px; }
.lp-card { position: relative; background: var(--panel); border-radius: 14px; padding: 28px; box-shadow: 0 8px 28px rgba(29, 35, 48, 0.08); }
.lp-eyebrow { text-transform: uppercase; font-size: 12px; color: var(--muted); letter-spacing: 0.08em; }
.lp-muted { color: var(--muted); }
.lp-trust li { margin: 6px 0; }
.lp-contact dt { font-weight: 600; margin-top: 8px; }
.lp-contact dd { margin: 2px 0 0; }
.lp-btn { display: inline-block; padding: 10px 18px; border-radius: 8px; background: var(--accent); color: #fff; text-decoration: none; }
.lp-ribbon { position: absolute; top: 12px; right: 12px; font-size: 11px; padding: 2px 8px; border-radius: 6px; background: #ffe8a3; }
"
}
