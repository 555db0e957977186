//! Asset path redirection
//!
//! During development the asset manifest may not live next to the asset
//! resources, so the paths handed to the server get rewritten. The rewrite
//! happens at the launch-argument seam: any argument that names a redirect
//! source path is replaced with its target.

use crate::config::AssetRedirect;
use std::path::Path;

/// Apply the redirect table to a launch argument list
pub fn apply_redirects(args: &[String], redirects: &[AssetRedirect]) -> Vec<String> {
    if redirects.is_empty() {
        return args.to_vec();
    }

    args.iter()
        .map(|arg| {
            let path = Path::new(arg);
            for redirect in redirects {
                if path == redirect.source {
                    return redirect.target.display().to_string();
                }
            }
            arg.clone()
        })
        .collect()
}
