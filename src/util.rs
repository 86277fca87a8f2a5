use std::io::{self, Read};

/// Reads until `buf` is full or the reader is exhausted, returning the
/// number of bytes actually placed into `buf`. Unlike `Read::read`, this
/// loops past short reads; unlike `read_exact`, it tolerates EOF.
pub fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
