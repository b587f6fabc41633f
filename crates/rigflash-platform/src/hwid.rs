use rand::Rng;

pub const HW_ID_LENGTH: usize = 12;

// base58: no 0, O, I or l
const HW_ID_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub trait IdentityProvider {
    fn generate(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomHwId;

impl IdentityProvider for RandomHwId {
    fn generate(&self) -> String {
        generate_hw_id(&mut rand::thread_rng())
    }
}

pub fn generate_hw_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..HW_ID_LENGTH)
        .map(|_| HW_ID_ALPHABET[rng.gen_range(0..HW_ID_ALPHABET.len())] as char)
        .collect()
}
