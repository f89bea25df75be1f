/// Session cookies collected from upstream responses, one value per cookie name.
///
/// Names keep the position of their first appearance; later values overwrite earlier ones.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert every `(name, value)` pair. Cookies with an empty name are skipped.
    pub fn capture<I, N, V>(&mut self, cookies: I)
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in cookies {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }

            let value = value.as_ref().to_string();
            match self.cookies.iter_mut().find(|(n, _)| n == name) {
                Some(entry) => entry.1 = value,
                None => self.cookies.push((name.to_string(), value)),
            }
        }
    }

    /// Value for the `Cookie` request header, `None` when the jar is empty.
    pub fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        let header = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        Some(header)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }
}
