//! args 库：宿主注入的程序参数

use super::{new_lib, Args};
use crate::core::{Table, TableRef, Value, VmError};
use crate::program::{ProgramArgs, WebArgs};
use crate::runtime::vm::Vm;

/// 只读表 `{url, method, headers, body}`
fn web_table(args: &WebArgs) -> Value {
    let query = args.url.query.iter().map(|(k, values)| {
        let list = Table::from_values(values.iter().map(|v| Value::from(v.as_str()))).frozen();
        (k.as_str(), Value::table(list))
    });

    let url = Table::from_pairs([
        ("rawpath", Value::from(args.url.rawpath.as_str())),
        ("path", Value::from(args.url.path.as_str())),
        ("rawquery", Value::from(args.url.rawquery.as_str())),
        ("query", Value::table(Table::from_pairs(query).frozen())),
    ])
    .frozen();

    let headers = Table::from_pairs(
        args.headers
            .iter()
            .map(|(k, v)| (k.as_str(), Value::from(v.as_str()))),
    )
    .frozen();

    let web = Table::from_pairs([
        ("url", Value::table(url)),
        ("method", Value::from(args.method.as_str())),
        ("headers", Value::table(headers)),
        ("body", Value::buffer(args.body.clone())),
    ])
    .frozen();

    Value::table(web)
}

fn args_web(vm: &mut Vm, _: &mut Args) -> Result<Vec<Value>, VmError> {
    match vm.program_args() {
        ProgramArgs::Web(web) => Ok(vec![web_table(web)]),
        ProgramArgs::None => Err(VmError::new("web args only available in web mode")),
    }
}

pub(super) fn lib() -> TableRef {
    new_lib(&[("web", args_web)], vec![])
}
