/// Size in bytes of a machine word on the target. Frame slots and
/// struct-embedded fields are padded to this boundary.
pub const WORD_SIZE: i32 = 4;
