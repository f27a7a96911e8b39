use roxmltree::{Document, Node};

/// Physical z spacing read from OME-XML metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSpacing {
    /// Distance between adjacent planes, in `unit` (commonly micrometres).
    pub value: f64,
    pub unit: Option<String>,
}

/// Resolve the z spacing from a primary OME-XML document, falling back to a
/// second document (typically from a sibling stack) when the primary has none.
pub fn resolve(primary: Option<&str>, fallback: Option<&str>) -> Option<PhysicalSpacing> {
    primary
        .and_then(resolve_in_document)
        .or_else(|| fallback.and_then(resolve_in_document))
}

/// Resolve the z spacing from one OME-XML document.
///
/// Looks for `Image > Pixels` (any namespace prefix) and reads
/// `PhysicalSizeZ`, accepting each field as an attribute, a lower-cased
/// attribute, or a child element's text. Unparsable and non-positive values
/// count as absent.
pub fn resolve_in_document(xml: &str) -> Option<PhysicalSpacing> {
    let document = Document::parse(xml).ok()?;
    let root = document.root_element();
    let image = root.children().find(|node| node.has_tag_name("Image"))?;
    let pixels = image.children().find(|node| node.has_tag_name("Pixels"))?;

    let raw = field_value(pixels, "PhysicalSizeZ")?;
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let unit = field_value(pixels, "PhysicalSizeZUnit")
        .map(|unit| unit.trim().to_string())
        .filter(|unit| !unit.is_empty());

    Some(PhysicalSpacing { value, unit })
}

/// Read a metadata field from a node, trying the attribute, the lower-cased
/// attribute, then a child element's text. Empty results fall through to the
/// next level.
fn field_value<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    let lowered = name.to_ascii_lowercase();
    node.attribute(name)
        .filter(|value| !value.is_empty())
        .or_else(|| {
            node.attribute(lowered.as_str())
                .filter(|value| !value.is_empty())
        })
        .or_else(|| {
            node.children()
                .find(|child| child.has_tag_name(name))
                .and_then(|child| child.text())
                .filter(|value| !value.is_empty())
        })
}
