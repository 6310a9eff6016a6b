use core::{num::NonZero, time::Duration};
use std::{fs, io, path::PathBuf};

use bytes::Bytes;
use http::{
    header::{HeaderName, HeaderValue, CONNECTION},
    uri::InvalidUri,
    HeaderMap, Uri,
};

use crate::{
    cmd::Cmd,
    descriptor::{self, Descriptor, Method, UnknownMethod},
    executor::{self, Payload, Retry},
    source::Limit,
    transport, VecProduce,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("either request count (-n) or time limit (-t) must be set")]
    NoLimit,
    #[error("concurrency level must be positive")]
    ZeroConcurrency,
    #[error("number of CPUs must be positive")]
    ZeroCpu,
    #[error("either target URL or descriptor list (-f) must be given")]
    NoTarget,
    #[error("target URL and descriptor list (-f) are mutually exclusive")]
    ConflictingTargets,
    #[error(transparent)]
    Method(#[from] UnknownMethod),
    #[error("invalid URL '{url}': {source}")]
    Uri { url: String, source: InvalidUri },
    #[error("URL '{0}' must be absolute, like 'http://host/path'")]
    RelativeUri(Uri),
    #[error("minimum body size {min} exceeds maximum {max}")]
    BodySize { min: u64, max: u64 },
    #[error(transparent)]
    Descriptor(#[from] descriptor::Error),
    #[error("descriptor list '{}' is empty", .0.display())]
    EmptyList(PathBuf),
    #[error("failed to read body file '{}': {source}", path.display())]
    Body { path: PathBuf, source: io::Error },
    #[error("malformed header '{0}', expected 'Name: value'")]
    Header(String),
    #[error("invalid content type '{0}'")]
    ContentType(String),
}

/// What to call.
#[derive(Debug)]
pub enum Target {
    /// The same descriptor over and over.
    One(Descriptor),
    /// Cycle through the list, wrapping around.
    List(VecProduce<Descriptor>),
}

/// Immutable run configuration.
#[derive(Debug)]
pub struct Config {
    /// Number of concurrent workers.
    pub concurrency: NonZero<usize>,
    pub limit: Limit,
    pub target: Target,
    pub transport: transport::Config,
    pub executor: executor::Config,
    /// Number of runtime threads.
    pub threads: NonZero<usize>,
    /// Print the final report as JSON.
    pub json: bool,
}

impl TryFrom<Cmd> for Config {
    type Error = Error;

    fn try_from(cmd: Cmd) -> Result<Self, Self::Error> {
        let Cmd {
            url,
            concurrency,
            requests,
            timelimit,
            keep_alive,
            timeout,
            method,
            headers,
            min,
            max,
            file,
            body,
            content_type,
            cpu,
            json,
            verbose: _,
        } = cmd;

        let limit = Limit::new(requests, Duration::from_secs(timelimit)).ok_or(Error::NoLimit)?;
        let concurrency = NonZero::new(concurrency).ok_or(Error::ZeroConcurrency)?;
        let threads = NonZero::new(cpu).ok_or(Error::ZeroCpu)?;
        if min > max {
            return Err(Error::BodySize { min, max });
        }

        let target = match (url, file) {
            (Some(url), None) => {
                let method: Method = method.parse()?;
                let target = url.parse().map_err(|source| Error::Uri { url, source })?;

                Target::One(Descriptor::new(method, absolute(target)?))
            }
            (None, Some(path)) => {
                let list = Descriptor::from_fs(&path)?;
                for desc in &list {
                    absolute(desc.target.clone())?;
                }

                Target::List(VecProduce::new(list).ok_or(Error::EmptyList(path))?)
            }
            (Some(..), Some(..)) => return Err(Error::ConflictingTargets),
            (None, None) => return Err(Error::NoTarget),
        };

        let mut header_map = HeaderMap::new();
        for header in &headers {
            let (name, value) = parse_header(header)?;
            header_map.append(name, value);
        }
        if !keep_alive {
            header_map.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let payload = match body {
            Some(path) => match fs::read(&path) {
                Ok(data) => Payload::File(Bytes::from(data)),
                Err(source) => return Err(Error::Body { path, source }),
            },
            None => Payload::Synthetic { min, max },
        };

        let content_type = match HeaderValue::try_from(content_type.as_str()) {
            Ok(v) => v,
            Err(..) => return Err(Error::ContentType(content_type)),
        };

        let m = Self {
            concurrency,
            limit,
            target,
            transport: transport::Config {
                timeout: Duration::from_secs(timeout),
                keep_alive,
            },
            executor: executor::Config {
                headers: header_map,
                payload,
                content_type: Some(content_type),
                retry: Retry::default(),
            },
            threads,
            json,
        };

        Ok(m)
    }
}

fn absolute(uri: Uri) -> Result<Uri, Error> {
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(Error::RelativeUri(uri));
    }

    Ok(uri)
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let malformed = || Error::Header(raw.to_string());

    let (name, value) = raw.split_once(':').ok_or_else(malformed)?;
    let name = HeaderName::try_from(name.trim()).map_err(|_| malformed())?;
    let value = HeaderValue::try_from(value.trim()).map_err(|_| malformed())?;

    Ok((name, value))
}

#[cfg(test)]
mod test {
    use std::{env, process};

    use clap::Parser;

    use super::*;
    use crate::Produce;

    fn parse(args: &[&str]) -> Result<Config, Error> {
        let cmd = Cmd::try_parse_from(core::iter::once("hbench").chain(args.iter().copied())).unwrap();
        Config::try_from(cmd)
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("hbench-{}-{name}", process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn defaults() {
        let cfg = parse(&["-n", "10", "http://127.0.0.1/"]).unwrap();

        assert_eq!(1, cfg.concurrency.get());
        assert_eq!(1, cfg.threads.get());
        assert_eq!(Limit::Count(10), cfg.limit);
        assert_eq!(Duration::from_secs(30), cfg.transport.timeout);
        assert!(!cfg.transport.keep_alive);
        assert_eq!(cfg.executor.headers[CONNECTION], "close");
        assert!(matches!(cfg.executor.payload, Payload::Synthetic { min: 10, max: 100 }));
        assert_eq!(Some(HeaderValue::from_static(executor::MULTIPART)), cfg.executor.content_type);
        assert!(!cfg.json);

        let Target::One(desc) = cfg.target else {
            panic!("single target expected");
        };
        assert_eq!(Method::Get, desc.method);
    }

    #[test]
    fn flags() {
        let cfg = parse(&[
            "-c",
            "8",
            "-n",
            "100",
            "-t",
            "5",
            "-k",
            "-s",
            "2",
            "-m",
            "put",
            "-H",
            "X-Token: 42",
            "-H",
            "X-Token: 43",
            "--min",
            "5",
            "--max",
            "5",
            "--content-type",
            "application/json",
            "--cpu",
            "4",
            "--json",
            "http://127.0.0.1/a.txt",
        ])
        .unwrap();

        assert_eq!(8, cfg.concurrency.get());
        assert_eq!(4, cfg.threads.get());
        assert_eq!(Limit::CountOrTime(100, Duration::from_secs(5)), cfg.limit);
        assert_eq!(Duration::from_secs(2), cfg.transport.timeout);
        assert!(cfg.transport.keep_alive);
        assert!(cfg.executor.headers.get(CONNECTION).is_none());
        assert_eq!(2, cfg.executor.headers.get_all("x-token").iter().count());
        assert!(matches!(cfg.executor.payload, Payload::Synthetic { min: 5, max: 5 }));
        assert!(cfg.json);

        let Target::One(desc) = cfg.target else {
            panic!("single target expected");
        };
        assert_eq!(Method::Put, desc.method);
    }

    #[test]
    fn limit_required() {
        assert!(matches!(parse(&["http://h/"]), Err(Error::NoLimit)));
    }

    #[test]
    fn positive_counts_required() {
        assert!(matches!(parse(&["-n", "1", "-c", "0", "http://h/"]), Err(Error::ZeroConcurrency)));
        assert!(matches!(parse(&["-n", "1", "--cpu", "0", "http://h/"]), Err(Error::ZeroCpu)));
    }

    #[test]
    fn target_required() {
        assert!(matches!(parse(&["-n", "1"]), Err(Error::NoTarget)));

        let path = temp_file("conflict.txt", "GET,http://h/\n");
        let path = path.to_str().unwrap();
        assert!(matches!(
            parse(&["-n", "1", "-f", path, "http://h/"]),
            Err(Error::ConflictingTargets)
        ));
    }

    #[test]
    fn invalid_target() {
        assert!(matches!(parse(&["-n", "1", "-m", "PATCH", "http://h/"]), Err(Error::Method(..))));
        assert!(matches!(parse(&["-n", "1", "/relative"]), Err(Error::RelativeUri(..))));
        assert!(matches!(parse(&["-n", "1", "http://h /"]), Err(Error::Uri { .. })));
    }

    #[test]
    fn body_bounds() {
        assert!(matches!(
            parse(&["-n", "1", "--min", "10", "--max", "9", "http://h/"]),
            Err(Error::BodySize { min: 10, max: 9 })
        ));
    }

    #[test]
    fn headers() {
        assert!(matches!(parse(&["-n", "1", "-H", "NoColon", "http://h/"]), Err(Error::Header(..))));
        assert!(matches!(parse(&["-n", "1", "-H", "Bad Name: v", "http://h/"]), Err(Error::Header(..))));

        let (name, value) = parse_header("Authorization: Bearer a:b").unwrap();
        assert_eq!("authorization", name.as_str());
        assert_eq!(value, "Bearer a:b");
    }

    #[test]
    fn descriptor_list() {
        let path = temp_file("list.txt", "get,http://h/0\n\nPOST,http://h/1\n");
        let cfg = parse(&["-t", "1", "-f", path.to_str().unwrap()]).unwrap();

        let Target::List(list) = cfg.target else {
            panic!("descriptor list expected");
        };
        assert_eq!(Method::Get, list.next().method);
        assert_eq!(Method::Post, list.next().method);
        assert_eq!(Method::Get, list.next().method);
    }

    #[test]
    fn descriptor_list_errors() {
        let path = temp_file("empty.txt", "\n\n");
        assert!(matches!(
            parse(&["-n", "1", "-f", path.to_str().unwrap()]),
            Err(Error::EmptyList(..))
        ));

        let path = temp_file("malformed.txt", "GET http://h/\n");
        assert!(matches!(
            parse(&["-n", "1", "-f", path.to_str().unwrap()]),
            Err(Error::Descriptor(descriptor::Error::Malformed { line: 1, .. }))
        ));

        let path = temp_file("relative.txt", "GET,/a\n");
        assert!(matches!(
            parse(&["-n", "1", "-f", path.to_str().unwrap()]),
            Err(Error::RelativeUri(..))
        ));

        assert!(matches!(
            parse(&["-n", "1", "-f", "/nonexistent/hbench/list"]),
            Err(Error::Descriptor(descriptor::Error::Io(..)))
        ));
    }

    #[test]
    fn body_file() {
        let path = temp_file("body.bin", "payload");
        let cfg = parse(&["-n", "1", "-m", "POST", "-b", path.to_str().unwrap(), "http://h/"]).unwrap();

        let Payload::File(data) = cfg.executor.payload else {
            panic!("file payload expected");
        };
        assert_eq!(b"payload"[..], data[..]);

        assert!(matches!(
            parse(&["-n", "1", "-b", "/nonexistent/hbench/body", "http://h/"]),
            Err(Error::Body { .. })
        ));
    }
}
