#[cfg(test)]

mod tests {
    use coppice::config::Config;
    use coppice::engine_base::EngineConfig;
    use coppice::grammar::RuleSet;
    use coppice::{Engine, ParseError, ParserLike, RuleSetBuilder};
    use insta::assert_snapshot;

    fn pascal_engine() -> Engine {
        let mut builder = RuleSetBuilder::new();
        builder
            .choice("expr", &["range", "real"])
            .concatenation("range", &["integer", "dots", "integer"])
            .concatenation("integer", &["int_pat"])
            .concatenation("real", &["real_pat"])
            .literal("dots", "..")
            .pattern("int_pat", "[0-9]+")
            .pattern("real_pat", "([0-9]+[.][0-9]*)|([.][0-9]+)");
        Engine::new(&builder.source()).unwrap()
    }

    #[test]
    fn single_literal_goal() {
        let mut builder = RuleSetBuilder::new();
        builder.literal("a", "a");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("a", "a").unwrap();
        let root = forest.root();
        assert_eq!(root.tag(), "a");
        assert_eq!(root.start(), 0);
        assert_eq!(root.length(), 1);
        assert_eq!(root.matched_text(), "a");
        assert!(root.is_leaf());
        assert!(
            engine.parse("a", "b").is_err(),
            "a non-matching literal must not parse"
        );
    }

    #[test]
    fn concatenation_of_terminals() {
        let mut builder = RuleSetBuilder::new();
        builder
            .concatenation("abc", &["a", "b", "c"])
            .literal("a", "a")
            .literal("b", "b")
            .literal("c", "c");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("abc", "abc").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"abc { 'a' 'b' 'c' }");
    }

    #[test]
    fn span_coverage_reproduces_the_input() {
        let engine = pascal_engine();
        let forest = engine.parse("expr", "12..345").unwrap();
        fn collect_leaves(node: coppice::NodeRef, out: &mut String) {
            if node.is_leaf() {
                out.push_str(node.matched_text());
                return;
            }
            for child in node.children() {
                collect_leaves(child, out);
            }
        }
        let mut text = String::new();
        collect_leaves(forest.root(), &mut text);
        assert_eq!(text, "12..345");
    }

    #[test]
    fn pascal_range_fractional_real() {
        let engine = pascal_engine();
        let forest = engine.parse("expr", ".5").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"expr { real { '.5' } }");
    }

    #[test]
    fn pascal_range_trailing_dot_real() {
        let engine = pascal_engine();
        let forest = engine.parse("expr", "1.").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"expr { real { '1.' } }");
    }

    #[test]
    fn pascal_range_integer_range() {
        let engine = pascal_engine();
        let forest = engine.parse("expr", "1..5").unwrap();
        assert_snapshot!(
            forest.to_bracketed_string(),
            @"expr { range { integer { '1' } '..' integer { '5' } } }"
        );
    }

    #[test]
    fn priority_choice_takes_the_matching_alternative() {
        let mut builder = RuleSetBuilder::new();
        builder
            .priority_choice("abc", &["a", "b", "c"])
            .literal("a", "a")
            .literal("b", "b")
            .literal("c", "c");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("abc", "a").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"abc { 'a' }");
        let forest = engine.parse("abc", "b").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"abc { 'b' }");
    }

    #[test]
    fn priority_choice_earlier_alternative_wins_on_span_tie() {
        // identifier declared first: "int" parses as an identifier
        let mut builder = RuleSetBuilder::new();
        builder
            .priority_choice("type", &["id", "kw"])
            .pattern("id", "[a-z]+")
            .literal("kw", "int");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("type", "int").unwrap();
        let root = forest.root();
        assert_eq!(root.alternative_count(), 1);
        assert_eq!(root.children().next().unwrap().tag(), "id");

        // keyword declared first: the same text parses as the keyword
        let mut builder = RuleSetBuilder::new();
        builder
            .priority_choice("type", &["kw", "id"])
            .pattern("id", "[a-z]+")
            .literal("kw", "int");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("type", "int").unwrap();
        let root = forest.root();
        assert_eq!(root.alternative_count(), 1);
        assert_eq!(root.children().next().unwrap().tag(), "kw");
    }

    #[test]
    fn later_completing_higher_priority_alternative_replaces() {
        // `whole` spans the text in one terminal and completes first; `pieces`
        // needs more rounds but is declared earlier, so it replaces in place
        let mut builder = RuleSetBuilder::new();
        builder
            .priority_choice("pc", &["pieces", "whole"])
            .concatenation("pieces", &["a", "b"])
            .literal("whole", "ab")
            .literal("a", "a")
            .literal("b", "b");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("pc", "ab").unwrap();
        let root = forest.root();
        assert_eq!(root.alternative_count(), 1);
        assert_eq!(root.children().next().unwrap().tag(), "pieces");
    }

    #[test]
    fn plain_choice_preserves_ambiguity() {
        let mut builder = RuleSetBuilder::new();
        builder
            .choice("amb", &["x", "y"])
            .concatenation("x", &["p"])
            .concatenation("y", &["q"])
            .pattern("p", "[ab]+")
            .pattern("q", "[a-z]+");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("amb", "ab").unwrap();
        let root = forest.root();
        assert!(root.is_ambiguous());
        assert_eq!(root.alternative_count(), 2);
        assert_eq!(root.alternative(0).next().unwrap().tag(), "x");
        assert_eq!(root.alternative(1).next().unwrap().tag(), "y");
        assert_snapshot!(
            forest.to_bracketed_string(),
            @"amb {* { x { 'ab' } } { y { 'ab' } } *}"
        );
    }

    #[test]
    fn ambiguity_under_a_priority_choice_keeps_one_representative() {
        let mut builder = RuleSetBuilder::new();
        builder
            .priority_choice("pc", &["dup"])
            .choice("dup", &["x", "y"])
            .concatenation("x", &["p"])
            .concatenation("y", &["q"])
            .pattern("p", "[ab]+")
            .pattern("q", "[a-z]+");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("pc", "ab").unwrap();
        let root = forest.root();
        assert_eq!(root.alternative_count(), 1);
        let dup = root.children().next().unwrap();
        assert_eq!(dup.tag(), "dup");
        assert!(dup.is_ambiguous());
    }

    #[test]
    fn skip_rules_interleave_anywhere() {
        let mut builder = RuleSetBuilder::new();
        builder
            .skip_pattern("WS", r"\s+")
            .multi("as", 1, None, "a")
            .literal("a", "a");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("as", " a a a ").unwrap();
        assert_snapshot!(
            forest.to_bracketed_string(),
            @"as { ' ' 'a' ' ' 'a' ' ' 'a' ' ' }"
        );
        let children: Vec<_> = forest.root().children().collect();
        assert_eq!(children.len(), 7);
        for (i, child) in children.iter().enumerate() {
            assert_eq!(child.is_skip(), i % 2 == 0, "children alternate skip/item");
        }
        let total: usize = children.iter().map(|c| c.length()).sum();
        assert_eq!(total, " a a a ".len());
    }

    #[test]
    fn non_terminal_skip_rule() {
        let mut builder = RuleSetBuilder::new();
        builder
            .skip("WS", &["ws_pat"])
            .pattern("ws_pat", r"\s+")
            .concatenation("pair", &["a", "b"])
            .literal("a", "a")
            .literal("b", "b");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("pair", "a b").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"pair { 'a' WS { ' ' } 'b' }");
    }

    #[test]
    fn nested_non_terminal_skip_rule() {
        let mut builder = RuleSetBuilder::new();
        builder
            .skip("WS", &["blank"])
            .concatenation("blank", &["ws_pat"])
            .pattern("ws_pat", r"\s+")
            .concatenation("pair", &["a", "b"])
            .literal("a", "a")
            .literal("b", "b");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("pair", "a b").unwrap();
        assert_snapshot!(
            forest.to_bracketed_string(),
            @"pair { 'a' WS { blank { ' ' } } 'b' }"
        );
    }

    #[test]
    fn multi_bounds() {
        let mut builder = RuleSetBuilder::new();
        builder.multi("as", 1, None, "a").literal("a", "a");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("as", "a").unwrap();
        assert_eq!(forest.root().children().count(), 1);
        let forest = engine.parse("as", "aa").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"as { 'a' 'a' }");
        assert!(engine.parse("as", "").is_err(), "min 1 is not met by empty input");
    }

    #[test]
    fn multi_with_min_zero_matches_the_empty_input() {
        let mut builder = RuleSetBuilder::new();
        builder.multi("bs", 0, None, "b").literal("b", "b");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("bs", "").unwrap();
        let root = forest.root();
        assert_eq!(root.tag(), "bs");
        assert_eq!(root.children().count(), 0);
        assert_eq!(root.length(), 0);
        assert_snapshot!(forest.to_bracketed_string(), @"bs { §empty }");
    }

    #[test]
    fn optional_item_inside_a_concatenation() {
        let mut builder = RuleSetBuilder::new();
        builder
            .concatenation("S", &["a", "opt", "b"])
            .multi("opt", 0, Some(1), "x")
            .literal("a", "a")
            .literal("b", "b")
            .literal("x", "x");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("S", "axb").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"S { 'a' opt { 'x' } 'b' }");
        let forest = engine.parse("S", "ab").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"S { 'a' opt { §empty } 'b' }");
    }

    #[test]
    fn separated_list() {
        let mut builder = RuleSetBuilder::new();
        builder
            .separated_list("list", 1, None, "a", "comma")
            .literal("a", "a")
            .literal("comma", ",");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("list", "a").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"list { 'a' }");
        let forest = engine.parse("list", "a,a").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"list { 'a' ',' 'a' }");
        match engine.parse("list", "a,") {
            Err(ParseError::ParseFailed { position, .. }) => {
                assert_eq!(position, 1, "a trailing separator is not a valid list end")
            }
            other => panic!("expected a parse failure, got {:?}", other),
        }
    }

    #[test]
    fn left_recursion_builds_a_left_leaning_tree() {
        let mut builder = RuleSetBuilder::new();
        builder
            .choice("E", &["Eplus", "n"])
            .concatenation("Eplus", &["E", "plus", "n"])
            .literal("plus", "+")
            .pattern("n", "[0-9]");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("E", "1+2+3").unwrap();
        assert_snapshot!(
            forest.to_bracketed_string(),
            @"E { Eplus { E { Eplus { E { '1' } '+' '2' } } '+' '3' } }"
        );
    }

    #[test]
    fn right_recursion_builds_a_right_leaning_tree() {
        let mut builder = RuleSetBuilder::new();
        builder
            .choice("R", &["nR", "n"])
            .concatenation("nR", &["n", "plus", "R"])
            .literal("plus", "+")
            .pattern("n", "[0-9]");
        let engine = Engine::new(&builder.source()).unwrap();
        let forest = engine.parse("R", "1+2").unwrap();
        assert_snapshot!(forest.to_bracketed_string(), @"R { nR { '1' '+' R { '2' } } }");
    }

    #[test]
    fn parse_failure_reports_the_longest_match_from_the_start() {
        let mut builder = RuleSetBuilder::new();
        builder
            .concatenation("S", &["ab", "c"])
            .concatenation("ab", &["a", "b"])
            .literal("a", "a")
            .literal("b", "b")
            .literal("c", "c");
        let engine = Engine::new(&builder.source()).unwrap();
        match engine.parse("S", "abx") {
            Err(ParseError::ParseFailed {
                goal,
                position,
                longest_match,
            }) => {
                assert_eq!(goal, "S");
                assert_eq!(position, 2);
                let diagnostic = longest_match.expect("the valid prefix produces a diagnostic");
                assert_eq!(diagnostic.root().tag(), "ab");
                assert_eq!(diagnostic.root().matched_text(), "ab");
            }
            other => panic!("expected a parse failure, got {:?}", other),
        }
    }

    #[test]
    fn parsing_twice_yields_structurally_equal_forests() {
        let engine = pascal_engine();
        let first = engine.parse("expr", "1..5").unwrap();
        let second = engine.parse("expr", "1..5").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_goal_rule_is_reported() {
        let mut builder = RuleSetBuilder::new();
        builder.literal("a", "a");
        let engine = Engine::new(&builder.source()).unwrap();
        assert_eq!(
            engine.parse("nope", "a"),
            Err(ParseError::RuleNotFound("nope".to_string()))
        );
    }

    #[test]
    fn unresolved_rule_reference_fails_engine_creation() {
        let mut builder = RuleSetBuilder::new();
        builder.concatenation("S", &["missing"]);
        assert!(Engine::new(&builder.source()).is_err());
    }

    #[test]
    fn round_limit_watchdog() {
        let mut builder = RuleSetBuilder::new();
        builder
            .concatenation("abc", &["a", "b", "c"])
            .literal("a", "a")
            .literal("b", "b")
            .literal("c", "c");
        let config = Config {
            engine_config: EngineConfig {
                max_growth_rounds: Some(1),
                max_graph_nodes: None,
            },
            ..Config::default()
        };
        let engine = Engine::with_config(&builder.source(), config).unwrap();
        assert_eq!(
            engine.parse("abc", "abc"),
            Err(ParseError::RoundLimitExceeded(1))
        );
    }

    #[test]
    fn graph_size_watchdog() {
        let mut builder = RuleSetBuilder::new();
        builder
            .concatenation("abc", &["a", "b", "c"])
            .literal("a", "a")
            .literal("b", "b")
            .literal("c", "c");
        let config = Config {
            engine_config: EngineConfig {
                max_growth_rounds: None,
                max_graph_nodes: Some(1),
            },
            ..Config::default()
        };
        let engine = Engine::with_config(&builder.source(), config).unwrap();
        assert_eq!(
            engine.parse("abc", "abc"),
            Err(ParseError::GraphSizeLimitExceeded(1))
        );
    }

    #[test]
    fn derived_relations_are_consistent() {
        let mut builder = RuleSetBuilder::new();
        builder
            .skip_pattern("WS", r"\s+")
            .choice("expr", &["range", "real"])
            .concatenation("range", &["integer", "dots", "integer"])
            .concatenation("integer", &["int_pat"])
            .concatenation("real", &["real_pat"])
            .literal("dots", "..")
            .pattern("int_pat", "[0-9]+")
            .pattern("real_pat", "([0-9]+[.][0-9]*)|([.][0-9]+)");
        let regex_config = Config::default().internal_config().regex_config;
        let rule_set: RuleSet<u16> = RuleSet::new(&builder.source(), &regex_config).unwrap();
        let expr = rule_set.rule_id_from_tag("expr").unwrap();
        let range = rule_set.rule_id_from_tag("range").unwrap();
        let integer = rule_set.rule_id_from_tag("integer").unwrap();
        let int_pat = rule_set.rule_id_from_tag("int_pat").unwrap();
        let real_pat = rule_set.rule_id_from_tag("real_pat").unwrap();
        let ws = rule_set.rule_id_from_tag("WS").unwrap();

        // first terminals close over first children, transitively
        let firsts = rule_set.first_terminals(expr);
        assert!(firsts.contains(int_pat.0 as usize));
        assert!(firsts.contains(real_pat.0 as usize));
        assert!(!firsts.contains(rule_set.rule_id_from_tag("dots").unwrap().0 as usize));

        // a terminal's first-terminal set is the singleton of itself
        assert!(rule_set.first_terminals(int_pat).contains(int_pat.0 as usize));

        // sub and super relations are inverses up to the first-child approximation
        assert!(rule_set.first_sub_rules(expr).contains(range.0 as usize));
        assert!(rule_set.super_rules(integer).contains(range.0 as usize));
        assert!(rule_set.could_have_first_child(range, integer));
        assert!(!rule_set.could_have_first_child(integer, range));
        for rule in 0..rule_set.rule_count() {
            let id = coppice::grammar::RuleID(rule as u16);
            for super_rule in rule_set.super_rules(id).ones() {
                let super_id = coppice::grammar::RuleID(super_rule as u16);
                assert!(
                    rule_set.could_have_first_child(super_id, id),
                    "super_rules and could_have_first_child must agree"
                );
            }
        }

        // the skip set and its first terminals
        assert!(rule_set.skip_rules().contains(ws.0 as usize));
        assert!(rule_set.skip_first_terminals().contains(ws.0 as usize));
        assert!(rule_set.is_skip_reachable(ws));
        assert!(!rule_set.is_skip_reachable(expr));
    }

    #[test]
    fn nullable_pattern_is_rejected_at_creation() {
        let mut builder = RuleSetBuilder::new();
        builder.pattern("p", "[0-9]*");
        assert!(Engine::new(&builder.source()).is_err());
    }

    #[test]
    fn rule_set_debug_output_is_stable() {
        let mut builder = RuleSetBuilder::new();
        builder
            .multi("as", 1, None, "a")
            .literal("a", "a")
            .skip_pattern("WS", r"\s+");
        let regex_config = Config::default().internal_config().regex_config;
        let rule_set: RuleSet<u8> = RuleSet::new(&builder.source(), &regex_config).unwrap();
        let first = format!("{:?}", rule_set);
        let second = format!("{:?}", rule_set);
        assert_eq!(first, second);
        assert!(first.contains("as[0]"));
    }
}
