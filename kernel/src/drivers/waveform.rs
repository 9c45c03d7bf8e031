// Full-refresh waveform for the 7.5" 800x480 UC8179 glass
//
// Each table is 7 phases of 6 bytes: one level-select byte followed by
// four frame counts and a repeat count. Only the first three phases are
// used; the rest are zero. The transition tables share the VCOM timing
// and differ only in their level-select bytes.

pub const LUT_LEN: usize = 42;

pub type Lut = [u8; LUT_LEN];

/// The five tables uploaded during init, in upload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waveform {
    pub vcom: Lut,
    pub white_to_white: Lut,
    pub black_to_white: Lut,
    pub white_to_black: Lut,
    pub black_to_black: Lut,
}

// shared frame timing of the three active phases
const TIMING: [[u8; 5]; 3] = [
    [0x0F, 0x0F, 0x00, 0x00, 0x01],
    [0x0F, 0x01, 0x0F, 0x01, 0x02],
    [0x0F, 0x0F, 0x00, 0x00, 0x01],
];

const fn lut(levels: [u8; 3]) -> Lut {
    let mut out = [0u8; LUT_LEN];
    let mut phase = 0;
    while phase < 3 {
        out[phase * 6] = levels[phase];
        let mut i = 0;
        while i < 5 {
            out[phase * 6 + 1 + i] = TIMING[phase][i];
            i += 1;
        }
        phase += 1;
    }
    out
}

pub const DEFAULT_WAVEFORM: Waveform = Waveform {
    vcom: lut([0x00, 0x00, 0x00]),
    white_to_white: lut([0x10, 0x84, 0x20]),
    black_to_white: lut([0x10, 0x84, 0x20]),
    white_to_black: lut([0x80, 0x84, 0x40]),
    black_to_black: lut([0x80, 0x84, 0x40]),
};

impl Waveform {
    /// `(command, table)` pairs in upload order.
    pub fn tables(&self) -> [(u8, &Lut); 5] {
        [
            (0x20, &self.vcom),
            (0x21, &self.white_to_white),
            (0x22, &self.black_to_white),
            (0x23, &self.white_to_black),
            (0x24, &self.black_to_black),
        ]
    }
}
