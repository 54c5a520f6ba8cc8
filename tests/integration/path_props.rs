//! Property tests for structural paths

use domreel::config::PrivacyConfig;
use domreel::path::{path_of, resolve};
use domreel::privacy::Redactor;
use domreel::{CompiledPolicy, Document};
use proptest::prelude::*;

const TAGS: &[&str] = &["div", "span", "section", "article", "em"];

/// One generated element: which earlier element it nests under (0 is the
/// body), its tag, and whether it carries an id.
type Spec = (usize, usize, bool);

fn render(specs: &[Spec]) -> String {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); specs.len() + 1];
    for (i, (parent, _, _)) in specs.iter().enumerate() {
        children[parent % (i + 1)].push(i + 1);
    }

    fn write(node: usize, specs: &[Spec], children: &[Vec<usize>], out: &mut String) {
        let (_, tag, with_id) = specs[node - 1];
        let tag = TAGS[tag % TAGS.len()];
        out.push('<');
        out.push_str(tag);
        if with_id {
            out.push_str(&format!(" id=\"n{node}\""));
        }
        out.push_str(&format!(" data-k=\"{node}\">"));
        for child in &children[node] {
            write(*child, specs, children, out);
        }
        out.push_str(&format!("</{tag}>"));
    }

    let mut out = String::from("<html><head></head><body>");
    for child in &children[0] {
        write(*child, specs, &children, &mut out);
    }
    out.push_str("</body></html>");
    out
}

fn elements(doc: &Document) -> Vec<(String, String)> {
    let body = doc.body().expect("Parsed documents have a body");
    doc.descendants(body)
        .into_iter()
        .filter_map(|node| {
            let key = doc.attr(node, "data-k")?.to_string();
            Some((key, path_of(doc, node)))
        })
        .collect()
}

fn lenient() -> CompiledPolicy {
    CompiledPolicy::compile(&PrivacyConfig {
        mask_all_inputs: false,
        block_selectors: Vec::new(),
        mask_text_selectors: Vec::new(),
    })
}

proptest! {
    /// Every element's path resolves back to that element
    #[test]
    fn prop_path_resolves_to_node(specs in prop::collection::vec((0usize..64, 0usize..8, any::<bool>()), 1..24)) {
        let doc = Document::parse(&render(&specs));
        let body = doc.body().unwrap();
        for node in doc.descendants(body) {
            if doc.is_element(node) {
                let path = path_of(&doc, node);
                prop_assert_eq!(resolve(&doc, &path), Some(node), "path {}", path);
            }
        }
    }

    /// Paths survive a serialize/parse cycle of the document
    #[test]
    fn prop_path_stable_across_reserialization(specs in prop::collection::vec((0usize..64, 0usize..8, any::<bool>()), 1..24)) {
        let original = Document::parse(&render(&specs));
        let (html, _) = Redactor::new(&original, &lenient()).document_html();
        let reparsed = Document::parse(&html);

        for (key, path) in elements(&original) {
            let node = resolve(&reparsed, &path);
            prop_assert!(node.is_some(), "path {} did not resolve", path);
            prop_assert_eq!(reparsed.attr(node.unwrap(), "data-k"), Some(key.as_str()));
        }
    }
}

/// Test that paths of removed elements stop resolving
#[test]
fn test_detached_path_does_not_resolve() {
    let mut doc = Document::parse(&render(&[(0, 0, false), (0, 0, false)]));
    let body = doc.body().unwrap();
    let second = doc.element_children(body).nth(1).unwrap();
    let path = path_of(&doc, second);
    assert_eq!(path, "div:nth-of-type(2)");
    doc.detach(second);
    assert_eq!(resolve(&doc, &path), None);
}
