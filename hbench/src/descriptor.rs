use core::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use http::Uri;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read descriptor list: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: expected 'METHOD,URL', got '{raw}'")]
    Malformed { line: usize, raw: String },
    #[error("line {line}: {source}")]
    Method { line: usize, source: UnknownMethod },
    #[error("line {line}: invalid URL '{url}': {source}")]
    Uri {
        line: usize,
        url: String,
        source: http::uri::InvalidUri,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported method '{0}', expected one of HEAD, GET, POST, PUT, DELETE")]
pub struct UnknownMethod(String);

/// HTTP methods this tool knows how to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Head,
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// All methods, in report order.
    pub const ALL: [Method; 5] = [Method::Head, Method::Get, Method::Post, Method::Put, Method::Delete];

    /// Dense index of this method, usable for per-method arrays.
    #[inline]
    pub const fn idx(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Returns `true` for methods that carry a request body.
    #[inline]
    pub const fn is_upload(self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(v: &str) -> Result<Self, Self::Err> {
        let m = match v.trim().to_ascii_uppercase().as_str() {
            "HEAD" => Method::Head,
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            _ => return Err(UnknownMethod(v.to_string())),
        };

        Ok(m)
    }
}

impl Display for Method {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        fmt.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(v: Method) -> Self {
        match v {
            Method::Head => http::Method::HEAD,
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
        }
    }
}

/// A single unit of work: which method to call on which target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub method: Method,
    pub target: Uri,
}

impl Descriptor {
    #[inline]
    pub const fn new(method: Method, target: Uri) -> Self {
        Self { method, target }
    }

    /// Loads descriptors from a line-oriented `METHOD,URL` file.
    ///
    /// Blank lines are skipped.
    pub fn from_fs<P>(path: P) -> Result<Vec<Self>, Error>
    where
        P: AsRef<Path>,
    {
        log::debug!("loading descriptors from '{}' ...", path.as_ref().display());

        let rd = File::open(path)?;
        Self::from_reader(BufReader::new(rd))
    }

    pub fn from_reader<R>(rd: R) -> Result<Vec<Self>, Error>
    where
        R: BufRead,
    {
        let mut out = Vec::new();
        for (idx, line) in rd.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            out.push(Self::parse_line(idx + 1, &line)?);
        }

        log::debug!("loaded {} descriptors", out.len());

        Ok(out)
    }

    fn parse_line(line: usize, raw: &str) -> Result<Self, Error> {
        let Some((method, url)) = raw.split_once(',') else {
            return Err(Error::Malformed { line, raw: raw.to_string() });
        };

        let method = method.parse().map_err(|source| Error::Method { line, source })?;
        let url = url.trim();
        let target = url.parse().map_err(|source| Error::Uri {
            line,
            url: url.to_string(),
            source,
        })?;

        Ok(Self::new(method, target))
    }
}
