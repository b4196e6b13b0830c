//! MurmurHash3 x64 128 位实现
//!
//! 结构哈希与去重都依赖这里的 128 位输出。种子同样是 128 位：低 64 位作为 h1，高 64 位作为 h2。

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b3fe_1a85_ec53);
    k ^ (k >> 33)
}

#[inline]
fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

/// 计算字节数据的 128 位 MurmurHash3
pub fn murmurhash3_128(data: &[u8], seed: u128) -> u128 {
    let mut h1 = seed as u64;
    let mut h2 = (seed >> 64) as u64;

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&block[..8]);
        hi.copy_from_slice(&block[8..]);

        h1 ^= mix_k1(u64::from_le_bytes(lo));
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        h2 ^= mix_k2(u64::from_le_bytes(hi));
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    let tail = blocks.remainder();
    if tail.len() > 8 {
        let mut k2: u64 = 0;
        for (i, byte) in tail[8..].iter().enumerate() {
            k2 ^= u64::from(*byte) << (i * 8);
        }
        h2 ^= mix_k2(k2);
    }
    if !tail.is_empty() {
        let mut k1: u64 = 0;
        for (i, byte) in tail.iter().take(8).enumerate() {
            k1 ^= u64::from(*byte) << (i * 8);
        }
        h1 ^= mix_k1(k1);
    }

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (u128::from(h2) << 64) | u128::from(h1)
}

/// 计算字符串（UTF-8 字节）的 128 位哈希
pub fn murmurhash3_128_str(s: &str, seed: u128) -> u128 {
    murmurhash3_128(s.as_bytes(), seed)
}

/// 计算 64 位整数（小端）的 128 位哈希
pub fn murmurhash3_128_u64(n: u64, seed: u128) -> u128 {
    murmurhash3_128(&n.to_le_bytes(), seed)
}

/// 以一个 128 位值（小端）作为输入继续哈希，用于把子哈希折叠进父哈希
pub fn murmurhash3_128_u128(n: u128, seed: u128) -> u128 {
    murmurhash3_128(&n.to_le_bytes(), seed)
}
