//! Purpose: Hold top-level CLI command dispatch for `wirecall`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command writes exactly one JSON document to stdout on success.
//! Invariants: Helpers in `main.rs` remain the source of argument and output shaping.

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Describe { manifest, method } => {
            let manifest = load_manifest(&manifest, None)?;
            let client = ServiceClient::new(UreqTransport::new());
            let value = match method {
                Some(method) => client.descriptor(&manifest, &method)?.summary_json(),
                None => {
                    let mut methods = Vec::with_capacity(manifest.methods.len());
                    for method in &manifest.methods {
                        methods.push(client.descriptor(&manifest, &method.name)?.summary_json());
                    }
                    json!({
                        "service": manifest.name,
                        "host": manifest.host,
                        "methods": methods,
                    })
                }
            };
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Call {
            manifest,
            method,
            args,
            host,
            headers,
            query,
            body_mode,
            dry_run,
            preview_limit,
        } => {
            let manifest = load_manifest(&manifest, host)?;
            let client = build_client(body_mode, preview_limit)?;
            let args = args
                .iter()
                .map(|raw| parse_cli_arg(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let options = call_options(&headers, &query, body_mode)?;

            if dry_run {
                let request = client.assemble(&manifest, &method, args, Some(options))?;
                emit_json(json!({ "request": request_json(request)? }));
                return Ok(RunOutcome::ok());
            }

            let value = client.invoke_with(&manifest, &method, args, options)?;
            emit_json(json!({ "result": return_json(value)? }));
            Ok(RunOutcome::ok())
        }
    }
}
