use clap;
use std::path::Path;
use std::str::FromStr;
use log::{info,error};
use crate::image::{self,AmigaDate,ImageKind};
use crate::STDRESULT;
use super::CommandError;

/// Write a blank image of the given kind to `path`.
/// ADF images are formatted as an empty volume called `name`.
pub fn create_image(path: &str,kind: ImageKind,name: &str,force: bool) -> STDRESULT {
    if !force && Path::new(path).exists() {
        error!("refusing to overwrite {}",path);
        return Err(Box::new(CommandError::FileExists(path.to_string())));
    }
    let buf = match kind {
        ImageKind::Adf => image::blank_adf(name,AmigaDate::now()),
        ImageKind::Raw => image::blank_raw(),
        ImageKind::Other => return Err(Box::new(CommandError::UnsupportedImageKind))
    };
    info!("writing {} bytes to {}",buf.len(),path);
    std::fs::write(path,&buf)?;
    Ok(())
}

pub fn mkimg(cmd: &clap::ArgMatches) -> STDRESULT {
    let typ = cmd.get_one::<String>("type").ok_or(CommandError::InvalidCommand)?;
    let path = cmd.get_one::<String>("dimg").ok_or(CommandError::InvalidCommand)?;
    let kind = ImageKind::from_str(typ)?;
    // volume name defaults to the file name, the extension is dropped later
    let default_name = match Path::new(path).file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => "empty".to_string()
    };
    let name = cmd.get_one::<String>("name").unwrap_or(&default_name);
    create_image(path,kind,name,cmd.get_flag("force"))
}
