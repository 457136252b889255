use super::node::{Attribute, Node, is_void};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unterminated attribute value at byte {offset}")]
    UnterminatedAttribute { offset: usize },
    #[error("unterminated comment at byte {offset}")]
    UnterminatedComment { offset: usize },
}

/// Parse markup into the top-level sequence of sibling nodes.
///
/// Lenient about structure: unmatched closers are dropped, unclosed elements
/// are closed at end of input, and a tag cut off by the end of input is kept
/// as literal text. An unterminated quoted value or comment is an error.
pub fn parse(input: &str) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser {
        input,
        bytes: input.as_bytes(),
        pos: 0,
        root: Vec::new(),
        stack: Vec::new(),
    };
    parser.run()?;
    Ok(parser.finish())
}

struct OpenElement {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    root: Vec<Node>,
    stack: Vec<OpenElement>,
}

impl Parser<'_> {
    fn run(&mut self) -> Result<(), ParseError> {
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] != b'<' {
                self.consume_text();
                continue;
            }
            match (self.peek_at(1), self.peek_at(2)) {
                (Some(b'!'), _) if self.input[self.pos..].starts_with("<!--") => {
                    self.consume_comment()?;
                }
                (Some(b'!' | b'?'), _) => self.consume_declaration(),
                (Some(b'/'), Some(next)) if is_name_start(next) => self.consume_end_tag(),
                (Some(next), _) if is_name_start(next) => self.consume_start_tag()?,
                _ => {
                    self.push_text("<");
                    self.pos += 1;
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.root
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.input[from..].find(needle).map(|found| from + found)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn consume_text(&mut self) {
        let start = self.pos;
        let end = self.find_from(start, "<").unwrap_or(self.bytes.len());
        self.pos = end;
        let input = self.input;
        self.push_text(&input[start..end]);
    }

    fn consume_comment(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let end = self
            .find_from(start + 4, "-->")
            .ok_or(ParseError::UnterminatedComment { offset: start })?
            + 3;
        self.pos = end;
        let input = self.input;
        self.push_text(&input[start..end]);
        Ok(())
    }

    /// `<!DOCTYPE ..>` and `<?xml ..?>` are kept verbatim.
    fn consume_declaration(&mut self) {
        let start = self.pos;
        let end = self.find_from(start, ">").map_or(self.bytes.len(), |end| end + 1);
        self.pos = end;
        let input = self.input;
        self.push_text(&input[start..end]);
    }

    /// Everything from `start` to end of input becomes text.
    fn keep_rest_as_text(&mut self, start: usize) {
        self.pos = self.bytes.len();
        let input = self.input;
        self.push_text(&input[start..]);
    }

    fn consume_end_tag(&mut self) {
        let start = self.pos;
        self.pos += 2;
        let name = self.read_name();
        let Some(end) = self.find_from(self.pos, ">") else {
            self.keep_rest_as_text(start);
            return;
        };
        self.pos = end + 1;

        // Close the nearest open element with this name; anything opened after
        // it is closed implicitly. Closers with no open match are dropped.
        if let Some(depth) = self.stack.iter().rposition(|open| open.name == name) {
            while self.stack.len() > depth {
                self.close_top();
            }
        }
    }

    fn consume_start_tag(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.read_name();
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    self.keep_rest_as_text(start);
                    return Ok(());
                }
                Some(b'>') => {
                    self.pos += 1;
                    self.open(name, attributes);
                    return Ok(());
                }
                Some(b'/') if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    self.append(Node::element(name, attributes, Vec::new()));
                    return Ok(());
                }
                Some(b'/' | b'=' | b'"' | b'\'') => {
                    // Stray punctuation inside a tag carries no meaning.
                    self.pos += 1;
                }
                Some(_) => attributes.push(self.read_attribute()?),
            }
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        self.input[start..self.pos].to_string()
    }

    fn read_attribute(&mut self) -> Result<Attribute, ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\''))
        {
            self.pos += 1;
        }
        let name = self.input[start..self.pos].to_string();

        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            return Ok(Attribute::bare(name));
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = match self.peek() {
            None => "",
            Some(quote @ (b'"' | b'\'')) => {
                let value_start = self.pos + 1;
                let quote = if quote == b'"' { "\"" } else { "'" };
                let end = self
                    .find_from(value_start, quote)
                    .ok_or(ParseError::UnterminatedAttribute { offset: self.pos })?;
                self.pos = end + 1;
                &self.input[value_start..end]
            }
            Some(_) => {
                let value_start = self.pos;
                while self
                    .peek()
                    .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>')
                {
                    self.pos += 1;
                }
                &self.input[value_start..self.pos]
            }
        };
        Ok(Attribute::new(name, value))
    }

    fn open(&mut self, name: String, attributes: Vec<Attribute>) {
        if is_void(&name) {
            self.append(Node::element(name, attributes, Vec::new()));
            return;
        }
        self.stack.push(OpenElement {
            name,
            attributes,
            children: Vec::new(),
        });
    }

    fn close_top(&mut self) {
        if let Some(open) = self.stack.pop() {
            self.append(Node::element(open.name, open.attributes, open.children));
        }
    }

    fn container(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(open) => &mut open.children,
            None => &mut self.root,
        }
    }

    fn append(&mut self, node: Node) {
        self.container().push(node);
    }

    /// Adjacent text runs are merged into one text node.
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let container = self.container();
        if let Some(Node::Text(last)) = container.last_mut() {
            last.push_str(text);
        } else {
            container.push(Node::text(text));
        }
    }
}

/// True if `name` would be read back as a tag name by [`parse`].
pub fn is_tag_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(is_name_start) && bytes.all(is_name_char)
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(name: &str, children: Vec<Node>) -> Node {
        Node::element(name, Vec::new(), children)
    }

    #[test]
    fn parses_text_and_self_closing_elements_as_siblings() {
        let nodes = parse("gibberish <hi /> bob<ignore />").expect("parse");
        assert_eq!(
            nodes,
            vec![
                Node::text("gibberish "),
                element("hi", Vec::new()),
                Node::text(" bob"),
                element("ignore", Vec::new()),
            ]
        );
    }

    #[test]
    fn parses_children_of_paired_elements() {
        let nodes = parse("<hi>bob <b>!</b></hi>").expect("parse");
        assert_eq!(
            nodes,
            vec![element(
                "hi",
                vec![Node::text("bob "), element("b", vec![Node::text("!")])]
            )]
        );
    }

    #[test]
    fn parses_quoted_unquoted_and_bare_attributes() {
        let nodes = parse(r#"<hi name="bob" alt='x y' n=3 flag />"#).expect("parse");
        let Node::Element { attributes, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(
            attributes,
            &vec![
                Attribute::new("name", "bob"),
                Attribute::new("alt", "x y"),
                Attribute::new("n", "3"),
                Attribute::bare("flag"),
            ]
        );
    }

    #[test]
    fn preserves_tag_name_case() {
        let nodes = parse("<notYourTag></notYourTag>").expect("parse");
        assert_eq!(nodes[0].tag_name(), Some("notYourTag"));
    }

    #[test]
    fn drops_unmatched_closers_and_closes_open_elements_at_eof() {
        let nodes = parse("a</b><c>d").expect("parse");
        assert_eq!(
            nodes,
            vec![Node::text("a"), element("c", vec![Node::text("d")])]
        );
    }

    #[test]
    fn closing_an_outer_element_closes_inner_ones() {
        let nodes = parse("<a><b>x</a>y").expect("parse");
        assert_eq!(
            nodes,
            vec![
                element("a", vec![element("b", vec![Node::text("x")])]),
                Node::text("y"),
            ]
        );
    }

    #[test]
    fn void_elements_take_no_children() {
        let nodes = parse("a<br>b").expect("parse");
        assert_eq!(
            nodes,
            vec![Node::text("a"), element("br", Vec::new()), Node::text("b")]
        );
    }

    #[test]
    fn comments_and_stray_angle_brackets_stay_text() {
        let nodes = parse("1 < 2 <!-- <hi /> --> ok").expect("parse");
        assert_eq!(nodes, vec![Node::text("1 < 2 <!-- <hi /> --> ok")]);
    }

    #[test]
    fn empty_input_is_empty_sequence() {
        assert!(parse("").expect("parse").is_empty());
    }

    #[test]
    fn tag_names_follow_the_parser() {
        assert!(is_tag_name("hi"));
        assert!(is_tag_name("notYourTag"));
        assert!(is_tag_name("x-y.z:w_1"));
        assert!(!is_tag_name(""));
        assert!(!is_tag_name("1st"));
        assert!(!is_tag_name("a b"));
    }

    #[test]
    fn tag_cut_off_at_end_of_input_stays_text() {
        let nodes = parse("hi <there /><bob /> ! <how / are you?").expect("parse");
        assert_eq!(
            nodes,
            vec![
                Node::text("hi "),
                element("there", Vec::new()),
                element("bob", Vec::new()),
                Node::text(" ! <how / are you?"),
            ]
        );
        assert_eq!(parse("a <b c=").expect("parse"), vec![Node::text("a <b c=")]);
        assert_eq!(parse("x</y").expect("parse"), vec![Node::text("x</y")]);
        assert_eq!(parse("<!DOCTYPE").expect("parse"), vec![Node::text("<!DOCTYPE")]);
    }

    #[test]
    fn truncated_tag_inside_an_element_stays_text_of_that_element() {
        let nodes = parse("<p>a <b").expect("parse");
        assert_eq!(nodes, vec![element("p", vec![Node::text("a <b")])]);
    }

    #[test]
    fn reports_unterminated_attribute_and_comment() {
        assert!(matches!(
            parse(r#"<a href="x>"#),
            Err(ParseError::UnterminatedAttribute { .. })
        ));
        assert!(matches!(
            parse("<!-- open"),
            Err(ParseError::UnterminatedComment { offset: 0 })
        ));
    }
}
