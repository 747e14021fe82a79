use crate::model::Offer;
use crate::utils::{date_format, escape_html};
use std::collections::HashMap;

/// Notification body. Placeholders are substituted from the map built in
/// [`offer_substitutions`]; every value is HTML-escaped before it gets here.
const OFFER_TEMPLATE: &str = "<b>🚚 Новий вантаж #{id}</b>\n\
Звідки: {from}\n\
Куди: {to}\n\
Вантаж: {cargo}\n\
Маса: <b>{mass}</b>\n\
Об'єм: <b>{volume}</b>\n\
Оплата: <b>{payment}</b>\n\
Відстань: {distance}\n\
Створено: {created}";

const FALLBACK_MESSAGE: &str =
    "🚚 Знайдено новий вантаж, але не вдалося відобразити деталі.";

const NOT_SET: &str = "—";

/// Substitutes `{name}` placeholders from `values`. Fails closed: a
/// placeholder with no entry in the map yields `None` so the caller can fall
/// back instead of sending a half-rendered message.
fn render_template(template: &str, values: &HashMap<&str, String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        let key = &after[..close];
        out.push_str(values.get(key)?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Some(out)
}

fn escaped(text: Option<&str>) -> String {
    text.filter(|s| !s.trim().is_empty())
        .map(escape_html)
        .unwrap_or_else(|| NOT_SET.to_string())
}

fn offer_substitutions(offer: &Offer) -> HashMap<&'static str, String> {
    let mut values = HashMap::new();

    values.insert("id", offer.id.to_string());
    values.insert(
        "from",
        escaped(offer.from.as_ref().and_then(|w| w.name.as_deref())),
    );
    values.insert(
        "to",
        escaped(offer.to.as_ref().and_then(|w| w.name.as_deref())),
    );
    values.insert("cargo", escaped(offer.cargo_name.as_deref()));
    values.insert(
        "mass",
        offer
            .mass
            .map(|m| format!("{} т", m))
            .unwrap_or_else(|| NOT_SET.to_string()),
    );
    values.insert(
        "volume",
        offer
            .volume
            .map(|v| format!("{} м³", v))
            .unwrap_or_else(|| NOT_SET.to_string()),
    );
    values.insert(
        "payment",
        offer
            .payment
            .as_ref()
            .and_then(|p| p.value.map(|v| (v, p.currency_name.as_deref())))
            .map(|(value, currency)| {
                format!("{} {}", value, escaped(currency))
            })
            .unwrap_or_else(|| NOT_SET.to_string()),
    );
    values.insert(
        "distance",
        offer
            .distance
            .map(|d| format!("{} км", d))
            .unwrap_or_else(|| NOT_SET.to_string()),
    );
    values.insert(
        "created",
        offer
            .date_create
            .as_deref()
            .and_then(date_format)
            .unwrap_or_else(|| NOT_SET.to_string()),
    );

    values
}

/// Renders one offer into the notification text. Never fails: when the
/// template cannot be fully substituted the generic fallback is returned so
/// the delivery loop keeps going.
pub fn format_offer(offer: &Offer) -> String {
    let values = offer_substitutions(offer);
    match render_template(OFFER_TEMPLATE, &values) {
        Some(text) => text,
        None => {
            log::error!(
                "Offer {} could not be rendered, sending fallback message",
                offer.id
            );
            FALLBACK_MESSAGE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Payment, Waypoint};

    fn offer() -> Offer {
        Offer {
            id: 998877,
            date_create: Some("2024-06-24T10:30:00+03:00".into()),
            from: Some(Waypoint {
                name: Some("Київ".into()),
            }),
            to: Some(Waypoint {
                name: Some("Львів".into()),
            }),
            cargo_name: Some("зерно <навалом>".into()),
            mass: Some(22.0),
            volume: Some(86.0),
            payment: Some(Payment {
                value: Some(25000.0),
                currency_name: Some("грн".into()),
            }),
            distance: Some(540.0),
        }
    }

    #[test]
    fn full_offer_renders_every_line() {
        let text = format_offer(&offer());
        assert!(text.contains("#998877"));
        assert!(text.contains("Звідки: Київ"));
        assert!(text.contains("Куди: Львів"));
        assert!(text.contains("22 т"));
        assert!(text.contains("25000 грн"));
        assert!(text.contains("24.06.24 07:30"));
    }

    #[test]
    fn external_content_is_escaped_before_substitution() {
        let text = format_offer(&offer());
        assert!(text.contains("зерно &lt;навалом&gt;"));
        assert!(!text.contains("<навалом>"));
    }

    #[test]
    fn missing_payload_fields_render_as_placeholders() {
        let bare = Offer {
            id: 1,
            date_create: None,
            from: None,
            to: None,
            cargo_name: None,
            mass: None,
            volume: None,
            payment: None,
            distance: None,
        };
        let text = format_offer(&bare);
        assert!(text.contains("Звідки: —"));
        assert!(text.contains("Створено: —"));
    }

    #[test]
    fn template_with_unknown_placeholder_fails_closed() {
        let values = offer_substitutions(&offer());
        assert_eq!(render_template("hello {nonexistent}", &values), None);
        assert_eq!(
            render_template("id is {id}", &values).as_deref(),
            Some("id is 998877")
        );
    }
}
