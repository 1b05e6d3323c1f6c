//! Framing for the `scp -t` sink protocol.
//!
//! A single-file copy is one control line (`C<mode> <size> <name>\n`), the
//! raw file bytes, and a trailing NUL. The remote sink acknowledges each
//! part with a NUL byte on its stdout, or reports a warning (`0x01`) or
//! fatal error (`0x02`) followed by a message line.

use std::io::{Cursor, Read};

/// Mode written for every uploaded file; scripts are made executable later.
pub(crate) const UPLOAD_MODE: u32 = 0o644;

const SINK_WARNING: u8 = 1;
const SINK_ERROR: u8 = 2;

/// Renders the control line announcing a file of `size` bytes.
pub(crate) fn copy_header(mode: u32, size: u64, remote_path: &str) -> String {
    format!("C{mode:04o} {size} {}\n", remote_basename(remote_path))
}

/// Chains the control line, file contents, and terminator into one stream.
pub(crate) fn framed<R: Read>(header: String, contents: R) -> impl Read {
    Cursor::new(header.into_bytes())
        .chain(contents)
        .chain(Cursor::new([0_u8]))
}

/// Extracts the first warning or error message reported by the sink.
pub(crate) fn sink_error(stdout: &str) -> Option<String> {
    let position = stdout
        .bytes()
        .position(|byte| byte == SINK_WARNING || byte == SINK_ERROR)?;
    let message = stdout
        .get(position.saturating_add(1)..)
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .trim();
    Some(if message.is_empty() {
        String::from("remote scp reported an error")
    } else {
        message.to_owned()
    })
}

fn remote_basename(remote_path: &str) -> &str {
    remote_path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(remote_path)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn drain(mut stream: impl Read) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    #[rstest]
    #[case("/tmp/provisioning-scripts/install.sh", "C0644 12 install.sh\n")]
    #[case("/tmp/runsc.toml", "C0644 12 runsc.toml\n")]
    #[case("relative.txt", "C0644 12 relative.txt\n")]
    fn header_names_the_remote_file(#[case] remote: &str, #[case] expected: &str) {
        assert_eq!(copy_header(UPLOAD_MODE, 12, remote), expected);
    }

    #[test]
    fn framed_stream_terminates_with_nul() {
        let header = copy_header(UPLOAD_MODE, 5, "/tmp/hello");
        let bytes = drain(framed(header, Cursor::new(b"hello".to_vec())))
            .unwrap_or_else(|err| panic!("drain: {err}"));

        assert_eq!(bytes, b"C0644 5 hello\nhello\0".to_vec());
    }

    #[rstest]
    #[case("\0\0\0", None)]
    #[case("\0\u{2}scp: /etc/x: Permission denied\n", Some("scp: /etc/x: Permission denied"))]
    #[case("\u{1}", Some("remote scp reported an error"))]
    fn sink_errors_are_extracted(#[case] stdout: &str, #[case] expected: Option<&str>) {
        assert_eq!(sink_error(stdout).as_deref(), expected);
    }
}
