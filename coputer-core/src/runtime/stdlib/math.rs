//! math 库
//!
//! 没有 random/randomseed：程序必须是确定性的。

use super::{new_lib, Args};
use crate::core::{TableRef, Value, VmError};
use crate::runtime::vm::Vm;
use std::f64::consts::PI;

type R = Result<Vec<Value>, VmError>;

fn num(n: f64) -> R {
    Ok(vec![Value::Number(n)])
}

macro_rules! unary {
    ($name:ident, $f:expr) => {
        fn $name(_: &mut Vm, args: &mut Args) -> R {
            let x = args.number()?;
            num($f(x))
        }
    };
}

unary!(math_abs, f64::abs);
unary!(math_acos, f64::acos);
unary!(math_asin, f64::asin);
unary!(math_atan, f64::atan);
unary!(math_ceil, f64::ceil);
unary!(math_cos, f64::cos);
unary!(math_cosh, f64::cosh);
unary!(math_deg, |x: f64| x * 180.0 / PI);
unary!(math_exp, f64::exp);
unary!(math_floor, f64::floor);
unary!(math_rad, |x: f64| x * PI / 180.0);
unary!(math_round, f64::round);
unary!(math_sin, f64::sin);
unary!(math_sinh, f64::sinh);
unary!(math_sqrt, f64::sqrt);
unary!(math_tan, f64::tan);
unary!(math_tanh, f64::tanh);

fn math_atan2(_: &mut Vm, args: &mut Args) -> R {
    let (y, x) = (args.number()?, args.number()?);
    num(y.atan2(x))
}

fn math_clamp(_: &mut Vm, args: &mut Args) -> R {
    let (x, min, max) = (args.number()?, args.number()?, args.number()?);
    if x < min {
        return num(min);
    }
    if x > max {
        return num(max);
    }
    num(x)
}

fn math_fmod(_: &mut Vm, args: &mut Args) -> R {
    let (x, y) = (args.number()?, args.number()?);
    num(x % y)
}

/// x = frac * 2^exp，0.5 <= |frac| < 1
pub fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || x.is_nan() || x.is_infinite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i32;
    if exp == 0 {
        // 非规格化数先放大
        let (frac, e) = frexp(x * 2f64.powi(64));
        return (frac, e - 64);
    }
    let frac = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (frac, exp - 1022)
}

fn math_frexp(_: &mut Vm, args: &mut Args) -> R {
    let (frac, exp) = frexp(args.number()?);
    Ok(vec![Value::Number(frac), Value::Number(exp as f64)])
}

fn math_ldexp(_: &mut Vm, args: &mut Args) -> R {
    let (x, e) = (args.number()?, args.number()?);
    num(x * 2f64.powi(e as i32))
}

fn math_lerp(_: &mut Vm, args: &mut Args) -> R {
    let (a, b, t) = (args.number()?, args.number()?, args.number()?);
    if t == 1.0 {
        return num(b);
    }
    num(a + (b - a) * t)
}

fn math_log(_: &mut Vm, args: &mut Args) -> R {
    let x = args.number()?;
    if args.len() > 1 {
        let base = args.number()?;
        return num(x.ln() / base.ln());
    }
    num(x.ln())
}

fn math_map(_: &mut Vm, args: &mut Args) -> R {
    let x = args.number()?;
    let (inmin, inmax) = (args.number()?, args.number()?);
    let (outmin, outmax) = (args.number()?, args.number()?);
    num(outmin + (x - inmin) * (outmax - outmin) / (inmax - inmin))
}

// 与 f64::max 不同，NaN 在这里按比较语义处理
fn math_max(_: &mut Vm, args: &mut Args) -> R {
    let mut best = args.number()?;
    for _ in 1..args.len() {
        let n = args.number()?;
        if n > best {
            best = n;
        }
    }
    num(best)
}

fn math_min(_: &mut Vm, args: &mut Args) -> R {
    let mut best = args.number()?;
    for _ in 1..args.len() {
        let n = args.number()?;
        if n < best {
            best = n;
        }
    }
    num(best)
}

fn math_modf(_: &mut Vm, args: &mut Args) -> R {
    let x = args.number()?;
    let int = x.trunc();
    let frac = if x.is_infinite() { 0.0f64.copysign(x) } else { x - int };
    Ok(vec![Value::Number(int), Value::Number(frac)])
}

fn math_pow(_: &mut Vm, args: &mut Args) -> R {
    let (x, y) = (args.number()?, args.number()?);
    num(x.powf(y))
}

fn math_sign(_: &mut Vm, args: &mut Args) -> R {
    let x = args.number()?;
    num(if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    })
}

// ===== Perlin 噪声 =====

const PERLIN_HASH: [u8; 257] = [
    151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225, 140, 36, 103, 30, 69, 142, 8, 99, 37, 240,
    21, 10, 23, 190, 6, 148, 247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219, 203, 117, 35, 11, 32, 57, 177, 33, 88,
    237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175, 74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83,
    111, 229, 122, 60, 211, 133, 230, 220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54, 65, 25, 63, 161, 1, 216,
    80, 73, 209, 76, 132, 187, 208, 89, 18, 169, 200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173, 186,
    3, 64, 52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212, 207, 206, 59, 227, 47, 16, 58, 17,
    182, 189, 28, 42, 223, 183, 170, 213, 119, 248, 152, 2, 44, 154, 163, 70, 221, 153, 101, 155, 167, 43, 172, 9, 129,
    22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232, 178, 185, 112, 104, 218, 246, 97, 228, 251, 34, 242, 193, 238,
    210, 144, 12, 191, 179, 162, 241, 81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157, 184,
    84, 204, 176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93, 222, 114, 67, 29, 24, 72, 243, 141, 128, 195,
    78, 66, 215, 61, 156, 180, 151,
];

const PERLIN_GRAD: [[f32; 3]; 16] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
    [1.0, 1.0, 0.0],
    [0.0, -1.0, 1.0],
    [-1.0, 1.0, 0.0],
    [0.0, -1.0, -1.0],
];

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(t: f32, a: f32, b: f32) -> f32 {
    a + t * (b - a)
}

fn grad(hash: u8, x: f32, y: f32, z: f32) -> f32 {
    let g = PERLIN_GRAD[(hash & 15) as usize];
    g[0] * x + g[1] * y + g[2] * z
}

fn h(i: u8) -> u8 {
    PERLIN_HASH[i as usize]
}

/// 三维 Perlin 噪声；格点下标按 8 位回绕
pub fn perlin(x: f32, y: f32, z: f32) -> f64 {
    let (xflr, yflr, zflr) = (x.floor(), y.floor(), z.floor());
    let (xi, yi, zi) = (xflr as i32 as u8, yflr as i32 as u8, zflr as i32 as u8);
    let (xf, yf, zf) = (x - xflr, y - yflr, z - zflr);
    let (u, v, w) = (fade(xf), fade(yf), fade(zf));

    let a = h(xi).wrapping_add(yi);
    let (aa, ab) = (h(a).wrapping_add(zi), h(a.wrapping_add(1)).wrapping_add(zi));
    let b = h(xi.wrapping_add(1)).wrapping_add(yi);
    let (ba, bb) = (h(b).wrapping_add(zi), h(b.wrapping_add(1)).wrapping_add(zi));

    let la = lerp(u, grad(h(aa), xf, yf, zf), grad(h(ba), xf - 1.0, yf, zf));
    let lb = lerp(u, grad(h(ab), xf, yf - 1.0, zf), grad(h(bb), xf - 1.0, yf - 1.0, zf));
    let la1 = lerp(
        u,
        grad(h(aa.wrapping_add(1)), xf, yf, zf - 1.0),
        grad(h(ba.wrapping_add(1)), xf - 1.0, yf, zf - 1.0),
    );
    let lb1 = lerp(
        u,
        grad(h(ab.wrapping_add(1)), xf, yf - 1.0, zf - 1.0),
        grad(h(bb.wrapping_add(1)), xf - 1.0, yf - 1.0, zf - 1.0),
    );

    lerp(w, lerp(v, la, lb), lerp(v, la1, lb1)) as f64
}

fn math_noise(_: &mut Vm, args: &mut Args) -> R {
    let x = args.number()?;
    let y = args.opt_number(0.0)?;
    let z = args.opt_number(0.0)?;
    num(perlin(x as f32, y as f32, z as f32))
}

pub(super) fn lib() -> TableRef {
    new_lib(
        &[
            ("abs", math_abs),
            ("acos", math_acos),
            ("asin", math_asin),
            ("atan", math_atan),
            ("atan2", math_atan2),
            ("ceil", math_ceil),
            ("clamp", math_clamp),
            ("cos", math_cos),
            ("cosh", math_cosh),
            ("deg", math_deg),
            ("exp", math_exp),
            ("floor", math_floor),
            ("fmod", math_fmod),
            ("frexp", math_frexp),
            ("ldexp", math_ldexp),
            ("lerp", math_lerp),
            ("log", math_log),
            ("map", math_map),
            ("max", math_max),
            ("min", math_min),
            ("modf", math_modf),
            ("noise", math_noise),
            ("pow", math_pow),
            ("rad", math_rad),
            ("round", math_round),
            ("sign", math_sign),
            ("sin", math_sin),
            ("sinh", math_sinh),
            ("sqrt", math_sqrt),
            ("tan", math_tan),
            ("tanh", math_tanh),
        ],
        vec![
            ("huge", Value::Number(f64::INFINITY)),
            ("pi", Value::Number(PI)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frexp() {
        assert_eq!(frexp(8.0), (0.5, 4));
        assert_eq!(frexp(-3.0), (-0.75, 2));
        assert_eq!(frexp(0.0), (0.0, 0));
        let (f, e) = frexp(f64::MIN_POSITIVE / 4.0);
        assert_eq!(f * 2f64.powi(e), f64::MIN_POSITIVE / 4.0);
    }

    #[test]
    fn test_noise_on_lattice_is_zero() {
        assert_eq!(perlin(1.0, 2.0, 3.0), 0.0);
        assert_eq!(perlin(-4.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_noise_is_bounded() {
        for i in 0..100 {
            let n = perlin(i as f32 * 0.37, i as f32 * 0.11, 0.5);
            assert!((-1.0..=1.0).contains(&n));
        }
    }
}
