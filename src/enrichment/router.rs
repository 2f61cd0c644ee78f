//! Enrichment router: picks which chain processes a given span.

use crate::config::EnrichmentConfig;
use crate::models::{Span, SpanKind};

/// Select the enrichment chain for `span`, matching router rules in order
/// against simple `field:value` predicates before falling back to
/// `router.catch_all`.
pub fn select_chain<'a>(config: &'a EnrichmentConfig, span: &Span) -> Option<&'a str> {
    for rule in &config.router.rules {
        if matches_rule(&rule.when, span) {
            return Some(rule.chain.as_str());
        }
    }
    config.router.catch_all.as_deref()
}

fn matches_rule(when: &str, span: &Span) -> bool {
    let Some((field, value)) = when.split_once(':') else {
        return false;
    };
    match field {
        "language_ext" => span.file_path.ends_with(value),
        "kind" => span_kind_tag(&span.span_kind) == value,
        "path_prefix" => span.file_path.starts_with(value),
        _ => false,
    }
}

fn span_kind_tag(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Function => "function",
        SpanKind::Method => "method",
        SpanKind::Class => "class",
        SpanKind::Module => "module",
        SpanKind::MarkdownSection { .. } => "markdown_section",
        SpanKind::Block => "block",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnrichmentConfig, RouterConfig, RouterRuleConfig};

    fn span(file_path: &str, kind: SpanKind) -> Span {
        Span {
            id: String::new(),
            file_path: file_path.to_string(),
            span_kind: kind,
            name: None,
            start_line: 1,
            end_line: 1,
            byte_start: 0,
            byte_end: 0,
            body: String::new(),
            span_hash: String::new(),
            parse_degraded: false,
        }
    }

    fn config_with_rules(rules: Vec<RouterRuleConfig>, catch_all: Option<&str>) -> EnrichmentConfig {
        EnrichmentConfig {
            chains: Default::default(),
            router: RouterConfig {
                rules,
                catch_all: catch_all.map(String::from),
            },
            placeholder_phrases: Vec::new(),
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let config = config_with_rules(
            vec![
                RouterRuleConfig { when: "language_ext:.py".to_string(), chain: "python-chain".to_string() },
                RouterRuleConfig { when: "kind:class".to_string(), chain: "class-chain".to_string() },
            ],
            Some("default"),
        );
        let result = select_chain(&config, &span("a.py", SpanKind::Class));
        assert_eq!(result, Some("python-chain"));
    }

    #[test]
    fn falls_back_to_catch_all_when_no_rule_matches() {
        let config = config_with_rules(vec![], Some("default"));
        let result = select_chain(&config, &span("a.rs", SpanKind::Function));
        assert_eq!(result, Some("default"));
    }
}
