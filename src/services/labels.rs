use serde::Serialize;
use serde_json::json;

use crate::models::Item;

/// Shelf label for one item. `qr_payload` is the text a QR renderer encodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelData {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub location: String,
    pub category: String,
    pub qr_payload: String,
}

pub fn item_label(item: &Item) -> LabelData {
    let qr_payload = json!({
        "id": item.id,
        "name": item.name,
        "sku": item.sku,
    })
    .to_string();

    LabelData {
        id: item.id.clone(),
        name: item.name.clone(),
        sku: item.sku.clone(),
        location: item.location.clone(),
        category: item.category.to_string(),
        qr_payload,
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn label_html(label: &LabelData) -> String {
    let sku = label
        .sku
        .as_deref()
        .map(|sku| {
            format!(
                r#"<div style="font-size: 8px; color: #666; font-family: monospace;">{}</div>"#,
                escape_html(sku)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<div class="label" data-qr="{qr}">
  <div style="flex: 1; min-width: 0;">
    <div style="font-weight: bold; font-size: 10px; overflow: hidden; text-overflow: ellipsis; white-space: nowrap;">{name}</div>
    {sku}
    <div style="font-size: 8px; color: #666; margin-top: 2px;">{location}</div>
    <div style="font-size: 7px; color: #999; margin-top: auto;">{category}</div>
  </div>
  <div class="qr"></div>
</div>"#,
        qr = escape_html(&label.qr_payload),
        name = escape_html(&label.name),
        sku = sku,
        location = escape_html(&label.location),
        category = escape_html(&label.category),
    )
}

/// Printable sheet of 2in x 1in labels. Each label carries its QR payload in
/// `data-qr` for the client-side renderer.
pub fn print_page(labels: &[LabelData]) -> String {
    let body: String = labels.iter().map(label_html).collect::<Vec<_>>().join("\n");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Inventory Labels</title>
<style>
  @media print {{ body {{ margin: 0; }} .no-print {{ display: none; }} }}
  body {{ font-family: system-ui, sans-serif; padding: 0.5in; }}
  .labels-container {{ display: flex; flex-wrap: wrap; gap: 4px; }}
  .label {{ width: 2in; height: 1in; padding: 4px; border: 1px solid #ccc; display: flex; gap: 8px; box-sizing: border-box; page-break-inside: avoid; }}
  .qr {{ width: 48px; height: 48px; }}
  .print-btn {{ position: fixed; top: 10px; right: 10px; padding: 10px 20px; background: #f59e0b; border: none; border-radius: 8px; cursor: pointer; }}
</style>
</head>
<body>
<button class="print-btn no-print" onclick="window.print()">Print Labels</button>
<div class="labels-container">
{body}
</div>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewItem};
    use chrono::Utc;

    fn item(name: &str, sku: Option<&str>) -> Item {
        NewItem {
            id: Some("item-1".to_string()),
            name: name.to_string(),
            category: Category::Acm,
            location: "Row 4".to_string(),
            sku: sku.map(str::to_string),
            ..Default::default()
        }
        .into_item(Utc::now())
    }

    #[test]
    fn test_qr_payload_identifies_item() {
        let label = item_label(&item("ACM Silver", Some("ACM-S")));
        let payload: serde_json::Value = serde_json::from_str(&label.qr_payload).unwrap();
        assert_eq!(payload["id"], "item-1");
        assert_eq!(payload["name"], "ACM Silver");
        assert_eq!(payload["sku"], "ACM-S");
        assert_eq!(label.category, "ACM");
    }

    #[test]
    fn test_print_page_escapes_text() {
        let labels = vec![item_label(&item("<b>Panel</b> & trim", None))];
        let html = print_page(&labels);
        assert!(html.contains("&lt;b&gt;Panel&lt;/b&gt; &amp; trim"));
        assert!(!html.contains("<b>Panel"));
        assert!(html.contains("Row 4"));
        assert!(html.contains("Print Labels"));
        assert!(!html.contains("monospace"));
    }
}
