use crate::errors::PathError;

/// One `name` or `name[index]` step of a dotted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment<'p> {
    pub name: &'p str,
    pub index: Option<usize>,
}

impl<'p> Segment<'p> {
    /// Anything that isn't `name` or `name[digits]` stays a bare name, brackets and all.
    fn parse(raw: &'p str) -> Self {
        let bare = Segment { name: raw, index: None };

        let Some(open) = raw.find('[') else {
            return bare;
        };
        if open == 0 || !raw.ends_with(']') {
            return bare;
        }

        let digits = &raw[open + 1..raw.len() - 1];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return bare;
        }

        match digits.parse::<usize>() {
            Ok(index) => Segment {
                name: &raw[..open],
                index: Some(index),
            },
            Err(_) => bare,
        }
    }
}

/// Parsed fresh on every access; there is no compiled form.
pub(crate) fn parse(path: &str) -> Result<Vec<Segment<'_>>, PathError> {
    if path.trim().is_empty() {
        return Err(PathError::EmptyPath);
    }
    Ok(path.split('.').map(Segment::parse).collect())
}
