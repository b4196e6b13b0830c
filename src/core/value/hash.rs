//! 元素结构哈希
//!
//! 为任意元素计算 128 位结构哈希，供去重与数组/对象比较使用。
//! 每种类型有独立的种子，对象属性的贡献以异或合并，因此与属性顺序无关。
//! 两个结构不同的元素在极小概率下可能产生相同哈希，去重会把它们当作重复项。

use super::types::{Element, Number};
use crate::core::murmur::{murmurhash3_128, murmurhash3_128_u128, murmurhash3_128_u64};

mod seeds {
    pub const ROOT: u128 = 0xbfc2_359e_ba00_91f1_0b2e_f8e3_9b94_7d2c;
    pub const UNDEFINED: u64 = 0x0000_0000_0000_0001;
    pub const NULL: u64 = 0x0000_0000_0000_0002;
    pub const FALSE: u64 = 0x0000_0000_0000_0003;
    pub const TRUE: u64 = 0x0000_0000_0000_0004;
    pub const NUMBER: u64 = 0x0000_0000_0000_0005;
    pub const STRING: u64 = 0x0000_0000_0000_0006;
    pub const ARRAY: u64 = 0x0000_0000_0000_0007;
    pub const OBJECT: u64 = 0x0000_0000_0000_0008;
    pub const GUID: u64 = 0x0000_0000_0000_0009;
    pub const BINARY: u64 = 0x0000_0000_0000_000a;
    pub const PROPERTY_NAME: u64 = 0x0000_0000_0000_000b;
    pub const ARRAY_INDEX: u64 = 0x0000_0000_0000_000c;
    pub const MIN_VALUE: u64 = 0x0000_0000_0000_000d;
    pub const MAX_VALUE: u64 = 0x0000_0000_0000_000e;
}

/// 计算元素（可能为 undefined）的结构哈希
pub fn structural_hash(element: Option<&Element>) -> u128 {
    hash_with_seed(element, seeds::ROOT)
}

/// 以指定种子计算结构哈希
pub fn hash_with_seed(element: Option<&Element>, seed: u128) -> u128 {
    let element = match element {
        Some(element) => element,
        None => return murmurhash3_128_u64(seeds::UNDEFINED, seed),
    };

    match element {
        Element::MinValue => murmurhash3_128_u64(seeds::MIN_VALUE, seed),
        Element::MaxValue => murmurhash3_128_u64(seeds::MAX_VALUE, seed),
        Element::Null => murmurhash3_128_u64(seeds::NULL, seed),
        Element::Boolean(false) => murmurhash3_128_u64(seeds::FALSE, seed),
        Element::Boolean(true) => murmurhash3_128_u64(seeds::TRUE, seed),
        Element::Number(number) => {
            let seed = murmurhash3_128_u64(seeds::NUMBER, seed);
            let seed = murmurhash3_128_u64(u64::from(number.subtype_rank()), seed);
            murmurhash3_128(&canonical_number_bytes(number), seed)
        }
        Element::String(s) => {
            murmurhash3_128(s.as_bytes(), murmurhash3_128_u64(seeds::STRING, seed))
        }
        Element::Guid(guid) => {
            murmurhash3_128(guid.as_bytes(), murmurhash3_128_u64(seeds::GUID, seed))
        }
        Element::Binary(bytes) => {
            murmurhash3_128(bytes, murmurhash3_128_u64(seeds::BINARY, seed))
        }
        Element::Array(items) => {
            let mut hash = murmurhash3_128_u64(seeds::ARRAY, seed);
            for (index, item) in items.iter().enumerate() {
                let index_seed =
                    murmurhash3_128_u64(index as u64, murmurhash3_128_u64(seeds::ARRAY_INDEX, hash));
                hash = hash_with_seed(Some(item), index_seed);
            }
            hash
        }
        Element::Object(properties) => {
            let mut combined: u128 = 0;
            for (name, value) in properties {
                let name_hash = murmurhash3_128(
                    name.as_bytes(),
                    murmurhash3_128_u64(seeds::PROPERTY_NAME, seeds::ROOT),
                );
                combined ^= hash_with_seed(Some(value), name_hash);
            }
            murmurhash3_128_u128(combined, murmurhash3_128_u64(seeds::OBJECT, seed))
        }
    }
}

/// 数值的规范字节形式：数值相等的元素（同一子类型内）必须得到相同字节
fn canonical_number_bytes(number: &Number) -> [u8; 9] {
    let mut bytes = [0u8; 9];
    match number.as_integer() {
        Some(i) if (i as f64) as i64 != i || i == i64::MAX => {
            // 无法用 f64 精确表示的整数
            bytes[0] = 1;
            bytes[1..].copy_from_slice(&i.to_le_bytes());
        }
        _ => {
            let mut f = number.as_f64();
            if f == 0.0 {
                f = 0.0;
            }
            let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
            bytes[1..].copy_from_slice(&bits.to_le_bytes());
        }
    }
    bytes
}
