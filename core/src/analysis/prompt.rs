use super::AnalysisRequest;

pub const SYSTEM_PROMPT: &str = "You are an expert code reviewer specializing in security analysis and code quality. Always respond with valid JSON.";

const RESPONSE_SHAPE: &str = r#"{
  "summary": "string",
  "security_issues": [
    {
      "severity": "critical|high|medium|low|info",
      "title": "string",
      "description": "string",
      "file_path": "string or null",
      "line_start": number or null,
      "line_end": number or null,
      "suggestion": "string",
      "cwe": "string or null",
      "code_snippet": "string or null"
    }
  ],
  "suggestions": ["string"],
  "overall_score": number
}"#;

pub fn review_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = format!(
        "You are an expert code reviewer. Analyze the following {} code and provide:\n\
         1. A brief summary of what the code does\n\
         2. Any security vulnerabilities found (with severity: critical, high, medium, low, info)\n\
         3. Code quality suggestions for improvement\n\
         4. An overall quality score from 0-100\n\n\
         Code to review:\n{}\n\n",
        request.language, request.code
    );

    if let Some(extra) = request.custom_prompt.as_deref() {
        prompt.push_str("Additional instructions:\n");
        prompt.push_str(extra);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Respond in JSON format with this structure:\n");
    prompt.push_str(RESPONSE_SHAPE);
    prompt
}
