#![no_main]

use hangman_session::protocol::{Envelope, ServerErrorPayload, ServerStats};
use hangman_session::GameState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Frames arrive as text; anything else never reaches the parser.
    let Ok(frame) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(envelope) = Envelope::from_frame(frame) else {
        return;
    };

    // Every payload decoder must reject garbage without panicking.
    let _ = envelope.payload::<GameState>();
    let _ = envelope.payload::<ServerStats>();
    let _ = envelope.payload::<ServerErrorPayload>();

    // A parsed envelope always re-encodes.
    let _ = envelope.to_frame();
});
