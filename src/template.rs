/// Replaces `{{name}}` placeholders with values from `vars`. Unknown
/// placeholders and any other brace text are left untouched, so instructions
/// or dockerfile snippets that themselves contain literal braces survive the
/// substitution unharmed.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        match after_open.find("}}") {
            Some(end) => {
                let key = after_open[..end].trim();
                match vars.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => output.push_str(value),
                    None => {
                        output.push_str("{{");
                        output.push_str(&after_open[..end]);
                        output.push_str("}}");
                    }
                }
                rest = &after_open[end + 2..];
            }
            None => {
                output.push_str("{{");
                rest = after_open;
            }
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholder() {
        let out = render("hello {{name}}", &[("name", "world")]);
        assert_eq!(out, "hello world");
    }

    #[test]
    fn leaves_unknown_placeholder_literal() {
        let out = render("{{known}} and {{unknown}}", &[("known", "x")]);
        assert_eq!(out, "x and {{unknown}}");
    }

    #[test]
    fn tolerates_whitespace_inside_braces() {
        let out = render("{{  name  }}", &[("name", "y")]);
        assert_eq!(out, "y");
    }

    #[test]
    fn substituted_value_is_not_re_scanned_for_placeholders() {
        let out = render("{{body}}", &[("body", "literal {{not_a_var}} text")]);
        assert_eq!(out, "literal {{not_a_var}} text");
    }

    #[test]
    fn unterminated_braces_pass_through() {
        let out = render("trailing {{oops", &[("oops", "x")]);
        assert_eq!(out, "trailing {{oops");
    }
}
