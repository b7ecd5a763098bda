#[macro_use]
extern crate afl;
use proteus::Envelope;

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = Envelope::deserialise(data);
    });
}
