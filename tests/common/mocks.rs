//! Mock version of an input stream;
use mockall::mock;

use std::io::{self, Read};

mock! {
    pub Stream {}
    impl Read for Stream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    }
}
