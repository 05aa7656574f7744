//! vector 库
//!
//! 三分量模式：构造出的向量 w 恒为 0，运算仍按四个分量进行。

use super::{new_lib, Args};
use crate::core::{TableRef, Value, Vector, VmError};
use crate::runtime::vm::Vm;

type R = Result<Vec<Value>, VmError>;

fn vector(v: Vector) -> R {
    Ok(vec![Value::Vector(v)])
}

fn map(v: Vector, f: impl Fn(f32) -> f32) -> Vector {
    v.map(f)
}

fn dot(a: Vector, b: Vector) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn magnitude(v: Vector) -> f32 {
    dot(v, v).sqrt()
}

fn cross(a: Vector, b: Vector) -> Vector {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
        0.0,
    ]
}

fn vector_create(_: &mut Vm, args: &mut Args) -> R {
    let x = args.number()? as f32;
    let y = args.number()? as f32;
    let z = args.number()? as f32;
    vector([x, y, z, 0.0])
}

fn vector_magnitude(_: &mut Vm, args: &mut Args) -> R {
    let v = args.vector()?;
    Ok(vec![Value::Number(magnitude(v) as f64)])
}

fn vector_normalize(_: &mut Vm, args: &mut Args) -> R {
    let v = args.vector()?;
    let inv = 1.0 / magnitude(v);
    vector(map(v, |x| x * inv))
}

fn vector_cross(_: &mut Vm, args: &mut Args) -> R {
    let (a, b) = (args.vector()?, args.vector()?);
    vector(cross(a, b))
}

fn vector_dot(_: &mut Vm, args: &mut Args) -> R {
    let (a, b) = (args.vector()?, args.vector()?);
    Ok(vec![Value::Number(dot(a, b) as f64)])
}

/// 两向量夹角；给出轴时按轴的方向带符号
fn vector_angle(_: &mut Vm, args: &mut Args) -> R {
    let (a, b) = (args.vector()?, args.vector()?);
    let axis = match args.opt_any() {
        Value::Nil => [0.0; 4],
        Value::Vector(v) => v,
        other => return Err(super::invalid_arg_type(3, "angle", "vector", other.type_name())),
    };

    let c = cross(a, b);
    let sin = ((c[0] * c[0] + c[1] * c[1] + c[2] * c[2]) as f64).sqrt();
    let cos = (a[0] * b[0] + a[1] * b[1] + a[2] * b[2]) as f64;
    let angle = sin.atan2(cos);

    if c[0] * axis[0] + c[1] * axis[1] + c[2] * axis[2] < 0.0 {
        return Ok(vec![Value::Number(-angle)]);
    }
    Ok(vec![Value::Number(angle)])
}

fn vector_floor(_: &mut Vm, args: &mut Args) -> R {
    vector(map(args.vector()?, f32::floor))
}

fn vector_ceil(_: &mut Vm, args: &mut Args) -> R {
    vector(map(args.vector()?, f32::ceil))
}

fn vector_abs(_: &mut Vm, args: &mut Args) -> R {
    vector(map(args.vector()?, f32::abs))
}

fn vector_sign(_: &mut Vm, args: &mut Args) -> R {
    vector(map(args.vector()?, |x| {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    }))
}

fn vector_clamp(_: &mut Vm, args: &mut Args) -> R {
    let v = args.vector()?;
    let (min, max) = (args.vector()?, args.vector()?);

    for (lane, name) in ["x", "y", "z"].iter().enumerate() {
        if min[lane] > max[lane] {
            return Err(VmError::new(format!(
                "max.{name} must be greater than or equal to min.{name}"
            )));
        }
    }

    let mut out = v;
    for lane in 0..4 {
        out[lane] = v[lane].max(min[lane]).min(max[lane]);
    }
    vector(out)
}

fn fold(args: &mut Args, pick: fn(f32, f32) -> f32) -> R {
    let mut result = args.vector()?;
    for _ in 1..args.len() {
        let next = args.vector()?;
        for lane in 0..4 {
            result[lane] = pick(result[lane], next[lane]);
        }
    }
    vector(result)
}

fn vector_max(_: &mut Vm, args: &mut Args) -> R {
    fold(args, f32::max)
}

fn vector_min(_: &mut Vm, args: &mut Args) -> R {
    fold(args, f32::min)
}

pub(super) fn lib() -> TableRef {
    new_lib(
        &[
            ("abs", vector_abs),
            ("angle", vector_angle),
            ("ceil", vector_ceil),
            ("clamp", vector_clamp),
            ("create", vector_create),
            ("cross", vector_cross),
            ("dot", vector_dot),
            ("floor", vector_floor),
            ("magnitude", vector_magnitude),
            ("max", vector_max),
            ("min", vector_min),
            ("normalize", vector_normalize),
            ("sign", vector_sign),
        ],
        vec![
            ("one", Value::Vector([1.0, 1.0, 1.0, 0.0])),
            ("zero", Value::Vector([0.0; 4])),
        ],
    )
}
